use axum::Router;

use crate::state::SharedState;

/// Swagger UI and OpenAPI document.
pub mod docs;
/// `GET`/`POST /api/game`.
pub mod game;
/// `GET /healthcheck`.
pub mod health;
/// `GET /api/game/events`.
pub mod sse;
/// `GET /socket` push channel.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(game::router())
        .merge(sse::router())
        .merge(websocket::router())
        .merge(docs::router())
        .with_state(state)
}
