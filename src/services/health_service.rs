use crate::{
    dto::{format_system_time, health::HealthResponse},
    state::SharedState,
};

/// Report liveness together with the number of connected observers.
pub fn health_status(state: &SharedState) -> HealthResponse {
    HealthResponse::ok(
        state.hub().observer_count(),
        format_system_time(state.started_at()),
    )
}
