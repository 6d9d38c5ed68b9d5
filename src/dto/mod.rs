use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Scoreboard document and its pure mutators.
pub mod game;
/// Health check payload.
pub mod health;
/// Validation helpers for inbound payloads.
pub mod validation;
/// Push-channel frame envelope.
pub mod ws;

pub(crate) fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
