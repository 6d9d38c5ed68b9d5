use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use crate::{
    dto::game::GameState,
    error::ServiceError,
    state::{ObserverId, SharedState},
};

/// Upper bound for acquiring the write gate and fanning an update out.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Current authoritative document, without side effects.
pub async fn current_game(state: &SharedState) -> GameState {
    state.store().read().await
}

/// Overwrite the stored document and broadcast it to every observer.
///
/// `origin` is the observer that sent the update over the push channel, `None` for
/// request/response writes.
pub async fn publish_update(
    state: &SharedState,
    origin: Option<ObserverId>,
    game: GameState,
) -> Result<GameState, ServiceError> {
    match timeout(PUBLISH_TIMEOUT, state.hub().publish(origin, game)).await {
        Ok(stored) => {
            info!(
                origin = ?origin,
                observers = state.hub().observer_count(),
                started = stored.started,
                team_a = stored.scores.team_a,
                team_b = stored.scores.team_b,
                "game state updated"
            );
            Ok(stored)
        }
        Err(_) => {
            warn!(origin = ?origin, "publishing game state timed out");
            Err(ServiceError::PublishTimeout(PUBLISH_TIMEOUT))
        }
    }
}
