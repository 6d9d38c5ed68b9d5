use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::Client;

use super::{EventSink, Tier, Transport, TransportError, TransportResult};
use crate::{config::api_url, dto::game::GameState};

const NAME: &str = "http";

/// Request/response access to the relay's `/api/game` endpoint.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    url: Arc<str>,
}

impl HttpTransport {
    /// Build a client for the relay at `endpoint`; every call is bounded by `timeout`.
    pub fn new(endpoint: &str, timeout: Duration) -> TransportResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| TransportError::ClientBuilder { source })?;

        Ok(Self {
            client,
            url: Arc::from(api_url(endpoint)),
        })
    }

    /// Endpoint this transport reads from and writes to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        NAME
    }

    fn tier(&self) -> Tier {
        Tier::Primary
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn subscribe(&self, _events: EventSink) {}

    fn connect(&self) -> BoxFuture<'static, TransportResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn send(&self, state: GameState) -> BoxFuture<'static, TransportResult<()>> {
        let client = self.client.clone();
        let url = Arc::clone(&self.url);
        Box::pin(async move {
            let response = client
                .post(url.as_ref())
                .json(&state)
                .send()
                .await
                .map_err(|source| TransportError::RequestSend {
                    url: url.to_string(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(TransportError::RequestStatus {
                    url: url.to_string(),
                    status: response.status(),
                })
            }
        })
    }

    fn fetch(&self) -> BoxFuture<'static, TransportResult<Option<GameState>>> {
        let client = self.client.clone();
        let url = Arc::clone(&self.url);
        Box::pin(async move {
            let response = client.get(url.as_ref()).send().await.map_err(|source| {
                TransportError::RequestSend {
                    url: url.to_string(),
                    source,
                }
            })?;

            if !response.status().is_success() {
                return Err(TransportError::RequestStatus {
                    url: url.to_string(),
                    status: response.status(),
                });
            }

            response
                .json::<GameState>()
                .await
                .map(Some)
                .map_err(|source| TransportError::DecodeResponse {
                    url: url.to_string(),
                    source,
                })
        })
    }

    fn disconnect(&self) -> BoxFuture<'static, ()> {
        Box::pin(async {})
    }
}
