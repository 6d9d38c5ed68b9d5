use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/api/game/events",
    tag = "push",
    responses((status = 200, description = "Stream of gameData events", content_type = "text/event-stream", body = String))
)]
/// Stream every stored scoreboard to read-only viewers.
pub async fn game_events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    info!("New game event stream connection");
    sse_service::game_stream(state).await
}

/// Configure the SSE endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/api/game/events", get(game_events))
}
