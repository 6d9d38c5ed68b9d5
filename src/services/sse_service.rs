use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::{
    dto::{game::GameState, ws::EVENT_GAME_DATA},
    state::{ObserverKind, SharedState},
};

/// Subscribe to the hub and stream every stored document as a `gameData` event,
/// starting with the current value.
pub async fn game_stream(
    state: SharedState,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (subscription, snapshot) = state
        .hub()
        .subscribe_with_snapshot(ObserverKind::EventStream)
        .await;
    let observer_id = subscription.id;
    let mut updates = subscription.receiver;

    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(event) = game_event(&snapshot) {
            if tx.send(Ok(event)).await.is_err() {
                state.hub().unsubscribe(&observer_id);
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                next = updates.recv() => {
                    let Some(game) = next else { break };
                    let Some(event) = game_event(&game) else { continue };
                    if tx.send(Ok(event)).await.is_err() {
                        break;
                    }
                }
            }
        }

        state.hub().unsubscribe(&observer_id);
        info!(observer = %observer_id, "game event stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn game_event(game: &GameState) -> Option<Event> {
    match Event::default().event(EVENT_GAME_DATA).json_data(game) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(error = %err, "failed to encode game event");
            None
        }
    }
}
