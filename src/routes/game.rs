use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    routing::get,
};

use crate::{
    dto::game::{GameState, UpdateAck},
    error::AppError,
    services::relay_service,
    state::SharedState,
};

/// Request/response access to the authoritative scoreboard.
pub fn router() -> Router<SharedState> {
    Router::new().route("/api/game", get(get_game).post(post_game))
}

/// Return the current scoreboard without side effects.
#[utoipa::path(
    get,
    path = "/api/game",
    tag = "game",
    responses(
        (status = 200, description = "Current game state", body = GameState)
    )
)]
pub async fn get_game(State(state): State<SharedState>) -> Json<GameState> {
    Json(relay_service::current_game(&state).await)
}

/// Overwrite the scoreboard and broadcast it to every connected observer.
#[utoipa::path(
    post,
    path = "/api/game",
    tag = "game",
    request_body = GameState,
    responses(
        (status = 200, description = "Update stored and broadcast", body = UpdateAck),
        (status = 400, description = "Body is not a game state document")
    )
)]
pub async fn post_game(
    State(state): State<SharedState>,
    payload: Result<Json<GameState>, JsonRejection>,
) -> Result<Json<UpdateAck>, AppError> {
    let Json(game) = payload?;
    relay_service::publish_update(&state, None, game).await?;
    Ok(Json(UpdateAck::ok()))
}
