use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status, always "ok" while the relay answers.
    pub status: String,
    /// Number of observers currently subscribed to the broadcast hub.
    pub observers: usize,
    /// RFC 3339 timestamp of the relay start.
    pub started_at: String,
}

impl HealthResponse {
    /// Create a health response indicating the relay is operational.
    pub fn ok(observers: usize, started_at: String) -> Self {
        Self {
            status: "ok".to_string(),
            observers,
            started_at,
        }
    }
}
