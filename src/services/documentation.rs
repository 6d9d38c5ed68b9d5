use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the scoreboard relay.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::game::get_game,
        crate::routes::game::post_game,
        crate::routes::sse::game_events,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::GameState,
            crate::dto::game::TeamNames,
            crate::dto::game::Scores,
            crate::dto::game::UpdateAck,
            crate::dto::ws::PushMessage,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "game", description = "Request/response access to the scoreboard"),
        (name = "push", description = "Push channel and event stream"),
    )
)]
pub struct ApiDoc;
