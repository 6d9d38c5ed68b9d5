/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Authoritative read/write path shared by every entry point.
pub mod relay_service;
/// Server-Sent Events stream of game updates.
pub mod sse_service;
/// WebSocket push-channel connection handling.
pub mod websocket_service;
