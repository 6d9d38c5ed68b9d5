use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    dto::ws::PushMessage,
    services::relay_service,
    state::{ObserverKind, SharedState, Subscription},
};

/// Failure while queueing a frame for a push client.
#[derive(Debug, Error)]
enum PushError {
    /// Writer channel closed - connection should be terminated immediately.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Handle the full lifecycle for an individual push-channel WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let (subscription, snapshot) = state
        .hub()
        .subscribe_with_snapshot(ObserverKind::PushSocket)
        .await;
    let Subscription {
        id: observer_id,
        receiver: mut updates,
        ..
    } = subscription;

    info!(observer = %observer_id, "push client connected");

    // New observers start from the stored value instead of waiting for the next write.
    if send_message_to_websocket(&outbound_tx, &PushMessage::GameData(snapshot)).is_err() {
        info!(observer = %observer_id, "connection closed during initial sync, terminating");
        state.hub().unsubscribe(&observer_id);
        finalize(writer_task, outbound_tx).await;
        return;
    }

    let forward_tx = outbound_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(game) = updates.recv().await {
            if send_message_to_websocket(&forward_tx, &PushMessage::GameData(game)).is_err() {
                break;
            }
        }
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match PushMessage::from_json_str(text.as_str()) {
                Ok(PushMessage::UpdateGameData(game)) => {
                    debug!(observer = %observer_id, "received update from push client");
                    if let Err(err) =
                        relay_service::publish_update(&state, Some(observer_id), game).await
                    {
                        warn!(observer = %observer_id, error = %err, "failed to publish push update");
                    }
                }
                Ok(other) => {
                    warn!(
                        observer = %observer_id,
                        event = other.event_name(),
                        "ignoring relay-only event sent by client"
                    );
                }
                Err(err) => {
                    warn!(observer = %observer_id, error = %err, "failed to parse push message");
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(observer = %observer_id, "push client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(observer = %observer_id, error = %err, "websocket error");
                break;
            }
        }
    }

    // Unsubscribing drops the hub side of the channel, which ends the forwarder.
    state.hub().unsubscribe(&observer_id);
    let _ = forwarder.await;
    info!(observer = %observer_id, "push client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failures are logged and swallowed; only a closed writer is an error.
fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), PushError>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| PushError::ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
