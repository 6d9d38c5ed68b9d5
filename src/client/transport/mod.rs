//! Transport strategies used by the sync client and the chain that orders them.

/// Hosted real-time store fallback.
pub mod hosted;
/// Request/response transport against `/api/game`.
pub mod http;
/// WebSocket push transport.
pub mod push;

use std::{sync::Arc, time::Duration};

use futures::future::{BoxFuture, join_all};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{config::ClientConfig, dto::game::GameState};

pub use hosted::HostedStoreTransport;
pub use http::HttpTransport;
pub use push::PushTransport;

/// Convenient result alias returning [`TransportError`] failures.
pub type TransportResult<T> = Result<T, TransportError>;

/// Failures raised while talking to the relay or the hosted store.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// The push channel could not be opened.
    #[error("failed to open push channel at `{url}`")]
    Connect {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },
    /// An operation did not finish within its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    /// The transport has no open link to send on.
    #[error("transport `{transport}` is not connected")]
    NotConnected { transport: &'static str },
    /// A request could not be sent.
    #[error("failed to send request to `{url}`")]
    RequestSend {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The remote answered with a non-success status.
    #[error("unexpected response status {status} from `{url}`")]
    RequestStatus { url: String, status: StatusCode },
    /// The response body was not a scoreboard document.
    #[error("failed to decode response from `{url}`")]
    DecodeResponse {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The outgoing document could not be serialized.
    #[error("failed to encode scoreboard document")]
    Encode(#[source] serde_json::Error),
    /// The transport does not implement this operation.
    #[error("transport `{transport}` does not support {operation}")]
    Unsupported {
        transport: &'static str,
        operation: &'static str,
    },
    /// Every tier of the chain failed.
    #[error("no transport could complete the operation")]
    Exhausted,
}

/// Priority class of a transport. Lower tiers are tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    /// The relay itself.
    Primary,
    /// Alternate store used when the relay cannot be reached.
    Fallback,
}

/// Notifications emitted by transports towards the sync client.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A persistent link came up.
    Connected { transport: &'static str },
    /// A persistent link went down.
    Disconnected { transport: &'static str },
    /// A remote peer published a new document.
    Remote {
        transport: &'static str,
        state: GameState,
    },
}

/// Channel transports use to report [`TransportEvent`]s.
pub type EventSink = mpsc::UnboundedSender<TransportEvent>;

/// A way of exchanging scoreboard documents with a remote peer.
pub trait Transport: Send + Sync {
    /// Short label used in logs and events.
    fn name(&self) -> &'static str;
    fn tier(&self) -> Tier;
    /// Whether the transport keeps a long-lived link that must be supervised.
    fn is_persistent(&self) -> bool {
        false
    }
    fn is_connected(&self) -> bool;
    /// Route future events to `events`, replacing any previous sink.
    fn subscribe(&self, events: EventSink);
    fn connect(&self) -> BoxFuture<'static, TransportResult<()>>;
    /// Deliver a full-document overwrite.
    fn send(&self, state: GameState) -> BoxFuture<'static, TransportResult<()>>;
    /// Read the current remote document, `None` when the remote holds nothing.
    fn fetch(&self) -> BoxFuture<'static, TransportResult<Option<GameState>>>;
    fn disconnect(&self) -> BoxFuture<'static, ()>;
}

/// Outcome of a successful [`TransportChain::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tier: Tier,
    pub delivered_by: Vec<&'static str>,
}

/// Transports grouped by tier, tried in priority order.
#[derive(Clone, Default)]
pub struct TransportChain {
    transports: Vec<Arc<dyn Transport>>,
}

impl TransportChain {
    /// Compose `transports`, keeping their relative order within each tier.
    pub fn new(mut transports: Vec<Arc<dyn Transport>>) -> Self {
        transports.sort_by_key(|transport| transport.tier());
        Self { transports }
    }

    /// Standard chain for a relay endpoint: push and request/response first,
    /// then the hosted store when one is configured.
    pub fn for_endpoint(endpoint: &str, config: &ClientConfig) -> TransportResult<Self> {
        let mut transports: Vec<Arc<dyn Transport>> = vec![
            Arc::new(PushTransport::new(endpoint)),
            Arc::new(HttpTransport::new(endpoint, config.request_timeout)?),
        ];
        if let Some(hosted) = &config.hosted {
            transports.push(Arc::new(HostedStoreTransport::new(
                hosted.clone(),
                config.request_timeout,
            )?));
        }
        Ok(Self::new(transports))
    }

    /// All transports in priority order.
    pub fn transports(&self) -> &[Arc<dyn Transport>] {
        &self.transports
    }

    /// Transports holding a long-lived link.
    pub fn persistent(&self) -> impl Iterator<Item = &Arc<dyn Transport>> {
        self.transports.iter().filter(|t| t.is_persistent())
    }

    /// True when at least one transport holds a long-lived link.
    pub fn has_persistent(&self) -> bool {
        self.persistent().next().is_some()
    }

    fn tiers(&self) -> Vec<Tier> {
        let mut tiers: Vec<Tier> = self.transports.iter().map(|t| t.tier()).collect();
        tiers.dedup();
        tiers
    }

    fn members(&self, tier: Tier) -> impl Iterator<Item = &Arc<dyn Transport>> {
        self.transports.iter().filter(move |t| t.tier() == tier)
    }

    /// Route every transport's events to `events`.
    pub fn subscribe_all(&self, events: EventSink) {
        for transport in &self.transports {
            transport.subscribe(events.clone());
        }
    }

    /// Send `state` to every usable transport of the first tier that accepts it.
    ///
    /// Members of a tier are attempted concurrently and one success is enough.
    /// Persistent transports without an open link are skipped. With both the push
    /// link and HTTP up, the relay receives the change twice and broadcasts both
    /// copies.
    pub async fn send(&self, state: &GameState) -> TransportResult<Delivery> {
        for tier in self.tiers() {
            let members: Vec<&Arc<dyn Transport>> = self
                .members(tier)
                .filter(|t| !t.is_persistent() || t.is_connected())
                .collect();
            if members.is_empty() {
                continue;
            }

            let outcomes = join_all(members.iter().map(|t| t.send(state.clone()))).await;
            let delivered_by: Vec<&'static str> = members
                .iter()
                .zip(outcomes)
                .filter_map(|(transport, outcome)| match outcome {
                    Ok(()) => Some(transport.name()),
                    Err(err) => {
                        debug!(transport = transport.name(), error = %err, "send failed");
                        None
                    }
                })
                .collect();

            if !delivered_by.is_empty() {
                return Ok(Delivery { tier, delivered_by });
            }
            warn!(?tier, "every transport in tier failed to send");
        }

        Err(TransportError::Exhausted)
    }

    /// Read the remote document through the first transport of `tier` able to answer.
    pub async fn fetch_tier(&self, tier: Tier) -> TransportResult<Option<GameState>> {
        let mut last_error = TransportError::Exhausted;
        for transport in self.members(tier) {
            match transport.fetch().await {
                Ok(state) => return Ok(state),
                Err(err @ TransportError::Unsupported { .. }) => last_error = err,
                Err(err) => {
                    debug!(transport = transport.name(), error = %err, "fetch failed");
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }

    /// Close every transport.
    pub async fn disconnect_all(&self) {
        join_all(self.transports.iter().map(|t| t.disconnect())).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    };

    use super::*;

    struct StubTransport {
        name: &'static str,
        tier: Tier,
        persistent: bool,
        healthy: AtomicBool,
        sent: Mutex<Vec<GameState>>,
    }

    impl StubTransport {
        fn new(name: &'static str, tier: Tier, healthy: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                tier,
                persistent: false,
                healthy: AtomicBool::new(healthy),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    impl Transport for Arc<StubTransport> {
        fn name(&self) -> &'static str {
            self.name
        }

        fn tier(&self) -> Tier {
            self.tier
        }

        fn is_persistent(&self) -> bool {
            self.persistent
        }

        fn is_connected(&self) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }

        fn subscribe(&self, _events: EventSink) {}

        fn connect(&self) -> BoxFuture<'static, TransportResult<()>> {
            Box::pin(async { Ok(()) })
        }

        fn send(&self, state: GameState) -> BoxFuture<'static, TransportResult<()>> {
            let this = Arc::clone(self);
            Box::pin(async move {
                if !this.healthy.load(Ordering::SeqCst) {
                    return Err(TransportError::NotConnected {
                        transport: this.name,
                    });
                }
                this.sent.lock().unwrap().push(state);
                Ok(())
            })
        }

        fn fetch(&self) -> BoxFuture<'static, TransportResult<Option<GameState>>> {
            let this = Arc::clone(self);
            Box::pin(async move {
                if this.healthy.load(Ordering::SeqCst) {
                    Ok(Some(GameState::default()))
                } else {
                    Err(TransportError::NotConnected {
                        transport: this.name,
                    })
                }
            })
        }

        fn disconnect(&self) -> BoxFuture<'static, ()> {
            Box::pin(async {})
        }
    }

    fn chain(stubs: &[&Arc<StubTransport>]) -> TransportChain {
        TransportChain::new(
            stubs
                .iter()
                .map(|stub| Arc::new(Arc::clone(stub)) as Arc<dyn Transport>)
                .collect(),
        )
    }

    #[tokio::test]
    async fn primary_tier_members_are_all_attempted() {
        let push = StubTransport::new("push", Tier::Primary, false);
        let http = StubTransport::new("http", Tier::Primary, true);
        let hosted = StubTransport::new("hosted", Tier::Fallback, true);

        let delivery = chain(&[&hosted, &push, &http])
            .send(&GameState::default())
            .await
            .unwrap();

        assert_eq!(delivery.tier, Tier::Primary);
        assert_eq!(delivery.delivered_by, vec!["http"]);
        assert_eq!(hosted.sent(), 0);
    }

    #[tokio::test]
    async fn falls_through_to_next_tier() {
        let http = StubTransport::new("http", Tier::Primary, false);
        let hosted = StubTransport::new("hosted", Tier::Fallback, true);

        let delivery = chain(&[&http, &hosted])
            .send(&GameState::default())
            .await
            .unwrap();

        assert_eq!(delivery.tier, Tier::Fallback);
        assert_eq!(hosted.sent(), 1);
    }

    #[tokio::test]
    async fn exhausted_when_every_tier_fails() {
        let http = StubTransport::new("http", Tier::Primary, false);
        let err = chain(&[&http])
            .send(&GameState::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Exhausted));
        assert!(chain(&[&http]).fetch_tier(Tier::Primary).await.is_err());
    }
}
