//! Persistent WebSocket link to the relay's `/socket` endpoint.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use futures::{SinkExt, Stream, StreamExt, future::BoxFuture};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
};
use tracing::{debug, info, warn};

use super::{EventSink, Tier, Transport, TransportError, TransportEvent, TransportResult};
use crate::{client::lock, config::push_url, dto::game::GameState, dto::ws::PushMessage};

const NAME: &str = "push";

/// Open socket: the writer queue and the tasks pumping both directions.
struct Link {
    generation: u64,
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

struct PushInner {
    url: String,
    link: Mutex<Option<Link>>,
    generation: AtomicU64,
    events: Mutex<Option<EventSink>>,
}

/// Push-channel client speaking `gameData` / `updateGameData` frames.
#[derive(Clone)]
pub struct PushTransport {
    inner: Arc<PushInner>,
}

impl PushTransport {
    /// Target the push endpoint of the relay at `endpoint`.
    pub fn new(endpoint: &str) -> Self {
        Self {
            inner: Arc::new(PushInner {
                url: push_url(endpoint),
                link: Mutex::new(None),
                generation: AtomicU64::new(0),
                events: Mutex::new(None),
            }),
        }
    }

    /// WebSocket URL this transport dials.
    pub fn url(&self) -> &str {
        &self.inner.url
    }
}

impl PushInner {
    fn emit(&self, event: TransportEvent) {
        if let Some(events) = lock(&self.events).as_ref() {
            let _ = events.send(event);
        }
    }

    /// Drop the link opened as `generation` if it is still the current one.
    fn link_closed(&self, generation: u64) {
        let closed = {
            let mut link = lock(&self.link);
            match link.as_ref() {
                Some(current) if current.generation == generation => link.take(),
                _ => None,
            }
        };

        if let Some(link) = closed {
            link.writer.abort();
            warn!(url = %self.url, "push channel closed");
            self.emit(TransportEvent::Disconnected { transport: NAME });
        }
    }

    async fn read_frames<S>(
        self: Arc<Self>,
        generation: u64,
        mut frames: S,
        outbound: mpsc::UnboundedSender<Message>,
    ) where
        S: Stream<Item = Result<Message, WsError>> + Unpin,
    {
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(Message::Text(text)) => match PushMessage::from_json_str(text.as_str()) {
                    Ok(PushMessage::GameData(state)) => {
                        self.emit(TransportEvent::Remote {
                            transport: NAME,
                            state,
                        });
                    }
                    Ok(other) => {
                        debug!(event = other.event_name(), "ignoring client-only event from relay");
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to parse push frame");
                    }
                },
                Ok(Message::Ping(payload)) => {
                    let _ = outbound.send(Message::Pong(payload));
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    warn!(url = %self.url, error = %err, "push channel error");
                    break;
                }
            }
        }

        self.link_closed(generation);
    }
}

impl Transport for PushTransport {
    fn name(&self) -> &'static str {
        NAME
    }

    fn tier(&self) -> Tier {
        Tier::Primary
    }

    fn is_persistent(&self) -> bool {
        true
    }

    fn is_connected(&self) -> bool {
        lock(&self.inner.link).is_some()
    }

    fn subscribe(&self, events: EventSink) {
        *lock(&self.inner.events) = Some(events);
    }

    fn connect(&self) -> BoxFuture<'static, TransportResult<()>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            if lock(&inner.link).is_some() {
                return Ok(());
            }

            let (socket, _response) = connect_async(inner.url.as_str())
                .await
                .map_err(|source| TransportError::Connect {
                    url: inner.url.clone(),
                    source: Box::new(source),
                })?;
            let (mut sink, stream) = socket.split();
            let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

            let writer = tokio::spawn(async move {
                while let Some(message) = outbound_rx.recv().await {
                    if sink.send(message).await.is_err() {
                        break;
                    }
                }
                let _ = sink.close().await;
            });

            let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

            // Register the link before the reader can observe a close for it.
            let stale = {
                let mut link = lock(&inner.link);
                let reader = tokio::spawn(Arc::clone(&inner).read_frames(
                    generation,
                    stream,
                    outbound.clone(),
                ));
                link.replace(Link {
                    generation,
                    outbound,
                    reader,
                    writer,
                })
            };
            if let Some(stale) = stale {
                stale.reader.abort();
                stale.writer.abort();
            }

            info!(url = %inner.url, "push channel connected");
            inner.emit(TransportEvent::Connected { transport: NAME });
            Ok(())
        })
    }

    fn send(&self, state: GameState) -> BoxFuture<'static, TransportResult<()>> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let payload = serde_json::to_string(&PushMessage::UpdateGameData(state))
                .map_err(TransportError::Encode)?;
            let link = lock(&inner.link);
            let Some(link) = link.as_ref() else {
                return Err(TransportError::NotConnected { transport: NAME });
            };
            link.outbound
                .send(Message::Text(payload.into()))
                .map_err(|_| TransportError::NotConnected { transport: NAME })
        })
    }

    fn fetch(&self) -> BoxFuture<'static, TransportResult<Option<GameState>>> {
        Box::pin(async {
            Err(TransportError::Unsupported {
                transport: NAME,
                operation: "fetch",
            })
        })
    }

    fn disconnect(&self) -> BoxFuture<'static, ()> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            let Some(link) = lock(&inner.link).take() else {
                return;
            };
            link.reader.abort();
            // The writer flushes the close frame, then ends once the queue is dropped.
            let _ = link.outbound.send(Message::Close(None));
            drop(link.outbound);
            let _ = link.writer.await;
            info!(url = %inner.url, "push channel disconnected");
        })
    }
}
