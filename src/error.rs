//! Error layering for the relay: services fail with [`ServiceError`], handlers turn
//! those into [`AppError`] responses carrying a JSON `{ "message": .. }` body.

use std::time::Duration;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use thiserror::Error;

/// Errors raised while reading or publishing the scoreboard.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The write gate could not be acquired, or fan-out stalled, within the bound.
    #[error("publishing the game state took longer than {0:?}")]
    PublishTimeout(Duration),
}

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    /// The request body is not a game state document.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// The relay could not accept the write right now.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::PublishTimeout(_) => AppError::ServiceUnavailable(err.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        (
            status,
            Json(ErrorBody {
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}
