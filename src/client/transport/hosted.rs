//! Alternate hosted real-time store reached over its REST surface.
//!
//! Documents live at `{base_url}/{path}.json`; a `null` body means the store is
//! empty. Remote changes are discovered by polling.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder};
use tokio::{task::JoinHandle, time::interval};
use tracing::{debug, info};

use super::{EventSink, Tier, Transport, TransportError, TransportEvent, TransportResult};
use crate::{
    client::lock,
    config::{DEFAULT_HOSTED_POLL_INTERVAL, HostedStoreConfig, non_zero_interval},
    dto::game::GameState,
};

const NAME: &str = "hosted";

struct HostedInner {
    client: Client,
    url: String,
    auth: Option<String>,
    poll_interval: Duration,
    events: Mutex<Option<EventSink>>,
    poller: Mutex<Option<JoinHandle<()>>>,
    /// Last document written by this client; its echo is not a remote change.
    last_sent: Mutex<Option<GameState>>,
}

/// Fallback transport backed by a Firebase-style REST store.
#[derive(Clone)]
pub struct HostedStoreTransport {
    inner: Arc<HostedInner>,
}

impl HostedStoreTransport {
    /// Build a transport for `config`; every request is bounded by `timeout`.
    pub fn new(config: HostedStoreConfig, timeout: Duration) -> TransportResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| TransportError::ClientBuilder { source })?;

        Ok(Self {
            inner: Arc::new(HostedInner {
                client,
                url: format!("{}/{}.json", config.base_url, config.path),
                auth: config.auth,
                poll_interval: non_zero_interval(
                    config.poll_interval,
                    DEFAULT_HOSTED_POLL_INTERVAL,
                ),
                events: Mutex::new(None),
                poller: Mutex::new(None),
                last_sent: Mutex::new(None),
            }),
        })
    }

    /// Document URL, without the auth token.
    pub fn url(&self) -> &str {
        &self.inner.url
    }
}

impl HostedInner {
    fn request(&self, method: Method) -> RequestBuilder {
        let builder = self.client.request(method, &self.url);
        match self.auth.as_deref() {
            Some(token) => builder.query(&[("auth", token)]),
            None => builder,
        }
    }

    async fn get_document(&self) -> TransportResult<Option<GameState>> {
        let response = self
            .request(Method::GET)
            .send()
            .await
            .map_err(|source| TransportError::RequestSend {
                url: self.url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(TransportError::RequestStatus {
                url: self.url.clone(),
                status: response.status(),
            });
        }

        response
            .json::<Option<GameState>>()
            .await
            .map_err(|source| TransportError::DecodeResponse {
                url: self.url.clone(),
                source,
            })
    }

    async fn put_document(&self, state: &GameState) -> TransportResult<()> {
        let response = self
            .request(Method::PUT)
            .json(state)
            .send()
            .await
            .map_err(|source| TransportError::RequestSend {
                url: self.url.clone(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::RequestStatus {
                url: self.url.clone(),
                status: response.status(),
            })
        }
    }

    /// Poll the store and report documents that neither match the previous poll
    /// nor the last value this client wrote. The first successful poll only
    /// establishes the baseline.
    async fn poll(self: Arc<Self>) {
        let mut ticker = interval(self.poll_interval);
        let mut last_seen: Option<Option<GameState>> = None;

        loop {
            ticker.tick().await;
            let current = match self.get_document().await {
                Ok(current) => current,
                Err(err) => {
                    debug!(error = %err, "hosted store poll failed");
                    continue;
                }
            };

            let baseline = last_seen.replace(current.clone());
            let Some(previous) = baseline else { continue };
            let Some(state) = current else { continue };
            let echoed = lock(&self.last_sent).as_ref() == Some(&state);
            if echoed || previous.as_ref() == Some(&state) {
                continue;
            }

            if let Some(events) = lock(&self.events).as_ref() {
                let _ = events.send(TransportEvent::Remote {
                    transport: NAME,
                    state,
                });
            }
        }
    }
}

impl Transport for HostedStoreTransport {
    fn name(&self) -> &'static str {
        NAME
    }

    fn tier(&self) -> Tier {
        Tier::Fallback
    }

    fn is_connected(&self) -> bool {
        lock(&self.inner.poller).is_some()
    }

    fn subscribe(&self, events: EventSink) {
        *lock(&self.inner.events) = Some(events);
    }

    fn connect(&self) -> BoxFuture<'static, TransportResult<()>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let mut poller = lock(&inner.poller);
            if poller.is_none() {
                *poller = Some(tokio::spawn(Arc::clone(&inner).poll()));
                info!(url = %inner.url, "watching hosted store");
            }
            Ok(())
        })
    }

    fn send(&self, state: GameState) -> BoxFuture<'static, TransportResult<()>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            // Recorded before the PUT so a poll racing the write still sees it as ours.
            let previous = lock(&inner.last_sent).replace(state.clone());
            let result = inner.put_document(&state).await;
            if result.is_err() {
                *lock(&inner.last_sent) = previous;
            }
            result
        })
    }

    fn fetch(&self) -> BoxFuture<'static, TransportResult<Option<GameState>>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move { inner.get_document().await })
    }

    fn disconnect(&self) -> BoxFuture<'static, ()> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            if let Some(poller) = lock(&inner.poller).take() {
                poller.abort();
            }
        })
    }
}
