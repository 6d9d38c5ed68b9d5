//! Application-level configuration loading for the relay and the sync client.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};

use crate::state::hub::DeliveryPolicy;

/// Default location on disk where binaries look for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/scoreboard.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SCOREBOARD_CONFIG_PATH";
/// Environment variable that overrides the relay endpoint used by clients.
const SERVER_ENV: &str = "SCOREBOARD_SERVER";
/// Query parameter that redirects a client to another relay at load time.
const SERVER_QUERY_KEY: &str = "server";

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_SERVER: &str = "http://localhost:5000";
const DEFAULT_CACHE_PATH: &str = "scoreboard-cache.json";
const DEFAULT_HOSTED_PATH: &str = "gameData";
/// Polling period of the hosted store when none is configured.
pub const DEFAULT_HOSTED_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Default)]
/// Runtime configuration shared by the binaries.
pub struct AppConfig {
    pub relay: RelayConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Settings for the relay server process.
pub struct RelayConfig {
    /// TCP port the relay listens on (all interfaces).
    pub port: u16,
    /// Whether the writer of an update also receives its echo.
    pub delivery: DeliveryPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            delivery: DeliveryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Settings for a [`SyncClient`](crate::client::SyncClient).
pub struct ClientConfig {
    /// Base URL of the relay, e.g. `http://192.168.1.20:5000`.
    pub server: String,
    /// File backing the durable local cache.
    pub cache_path: PathBuf,
    /// Period of the outbound queue drain.
    pub drain_interval: Duration,
    /// Upper bound for a single request/response call.
    pub request_timeout: Duration,
    /// Upper bound for opening the push channel.
    pub connect_timeout: Duration,
    /// Poll period used to notice cache writes from other processes; `None` disables it.
    pub cache_watch_interval: Option<Duration>,
    pub reconnect: ReconnectConfig,
    /// Alternate hosted store used when the relay is unreachable.
    pub hosted: Option<HostedStoreConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            drain_interval: Duration::from_millis(50),
            request_timeout: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(5),
            cache_watch_interval: Some(Duration::from_secs(1)),
            reconnect: ReconnectConfig::default(),
            hosted: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Bounded retry settings for the push channel.
pub struct ReconnectConfig {
    /// Attempts made before backing off for [`ReconnectConfig::cooldown`].
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub cooldown: Duration,
    /// Upper bound of the random delay added to every retry.
    pub jitter: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            cooldown: Duration::from_secs(10),
            jitter: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// REST surface of the alternate hosted real-time store.
pub struct HostedStoreConfig {
    /// Database root, e.g. `https://scoreboard-sync-default-rtdb.firebaseio.com`.
    pub base_url: String,
    /// Document path below the root, without the `.json` suffix.
    pub path: String,
    /// Optional `auth` query token.
    pub auth: Option<String>,
    pub poll_interval: Duration,
}

impl AppConfig {
    /// Load the configuration from disk and the environment, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        let mut config = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    info!(path = %path.display(), "loaded scoreboard configuration");
                    raw.into()
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        };

        config.apply_env();
        config
    }

    /// Apply `PORT`/`SERVER_PORT` and `SCOREBOARD_SERVER` overrides.
    fn apply_env(&mut self) {
        if let Some(port) = env::var("PORT")
            .or_else(|_| env::var("SERVER_PORT"))
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
        {
            self.relay.port = port;
        }

        if let Some(server) = env::var(SERVER_ENV).ok().filter(|s| !s.trim().is_empty()) {
            self.client.server = normalize_endpoint(&server);
        }
    }
}

impl ClientConfig {
    /// Apply a `server=<host>` override taken from a viewer URL query string.
    ///
    /// Returns `true` when the endpoint changed.
    pub fn apply_query_override(&mut self, query: &str) -> bool {
        match server_from_query(query) {
            Some(server) => {
                self.server = server;
                true
            }
            None => false,
        }
    }
}

/// Extract and normalize the `server` parameter from a query string.
pub fn server_from_query(query: &str) -> Option<String> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == SERVER_QUERY_KEY)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
        .map(normalize_endpoint)
}

/// Add a scheme when missing and drop trailing slashes.
pub fn normalize_endpoint(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

/// URL of the push channel for a relay endpoint.
pub fn push_url(endpoint: &str) -> String {
    let endpoint = normalize_endpoint(endpoint);
    let ws = if let Some(rest) = endpoint.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        endpoint
    };
    format!("{ws}/socket")
}

/// URL of the request/response endpoint for a relay endpoint.
pub fn api_url(endpoint: &str) -> String {
    format!("{}/api/game", normalize_endpoint(endpoint))
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    port: Option<u16>,
    echo_to_origin: Option<bool>,
    server: Option<String>,
    cache_path: Option<PathBuf>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    drain_interval_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    request_timeout_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    connect_timeout_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    cache_watch_interval_ms: Option<Duration>,
    reconnect: Option<RawReconnect>,
    hosted: Option<RawHosted>,
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawReconnect {
    max_attempts: Option<u32>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    initial_delay_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    max_delay_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    cooldown_ms: Option<Duration>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    jitter_ms: Option<Duration>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct RawHosted {
    base_url: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    auth: Option<String>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[serde(default)]
    poll_interval_ms: Option<Duration>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let relay_defaults = RelayConfig::default();
        let client_defaults = ClientConfig::default();

        let relay = RelayConfig {
            port: raw.port.unwrap_or(relay_defaults.port),
            delivery: match raw.echo_to_origin {
                Some(false) => DeliveryPolicy::ExcludeOrigin,
                Some(true) => DeliveryPolicy::IncludeOrigin,
                None => relay_defaults.delivery,
            },
        };

        let client = ClientConfig {
            server: raw
                .server
                .as_deref()
                .map(normalize_endpoint)
                .unwrap_or(client_defaults.server),
            cache_path: raw.cache_path.unwrap_or(client_defaults.cache_path),
            drain_interval: raw
                .drain_interval_ms
                .filter(|interval| !interval.is_zero())
                .unwrap_or(client_defaults.drain_interval),
            request_timeout: raw
                .request_timeout_ms
                .unwrap_or(client_defaults.request_timeout),
            connect_timeout: raw
                .connect_timeout_ms
                .unwrap_or(client_defaults.connect_timeout),
            cache_watch_interval: raw
                .cache_watch_interval_ms
                .map(|interval| Some(interval).filter(|d| !d.is_zero()))
                .unwrap_or(client_defaults.cache_watch_interval),
            reconnect: raw
                .reconnect
                .map(Into::into)
                .unwrap_or(client_defaults.reconnect),
            hosted: raw.hosted.map(Into::into),
        };

        Self { relay, client }
    }
}

impl From<RawReconnect> for ReconnectConfig {
    fn from(raw: RawReconnect) -> Self {
        let defaults = ReconnectConfig::default();
        Self {
            max_attempts: raw.max_attempts.unwrap_or(defaults.max_attempts).max(1),
            initial_delay: raw.initial_delay_ms.unwrap_or(defaults.initial_delay),
            max_delay: raw.max_delay_ms.unwrap_or(defaults.max_delay),
            cooldown: raw.cooldown_ms.unwrap_or(defaults.cooldown),
            jitter: raw.jitter_ms.unwrap_or(defaults.jitter),
        }
    }
}

impl From<RawHosted> for HostedStoreConfig {
    fn from(raw: RawHosted) -> Self {
        Self {
            base_url: raw.base_url.trim_end_matches('/').to_string(),
            path: raw
                .path
                .map(|p| p.trim_matches('/').to_string())
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_HOSTED_PATH.to_string()),
            auth: raw.auth.filter(|token| !token.is_empty()),
            poll_interval: raw
                .poll_interval_ms
                .filter(|interval| !interval.is_zero())
                .unwrap_or(DEFAULT_HOSTED_POLL_INTERVAL),
        }
    }
}

/// `interval`, or `fallback` when it is zero; timers cannot tick with a zero period.
pub fn non_zero_interval(interval: Duration, fallback: Duration) -> Duration {
    if interval.is_zero() {
        fallback
    } else {
        interval
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
