//! Library crate for scoreboard-relay: the relay server and the sync client that keep a
//! live scoreboard replicated across every open viewer.

#[cfg(feature = "client")]
pub mod client;
/// Relay and client configuration loading.
pub mod config;
/// Local persistence for sync clients.
pub mod dao;
/// Wire types shared by the relay and its clients.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// Axum routers for every relay entry point.
pub mod routes;
/// Relay behaviour behind the routes.
pub mod services;
/// Shared relay state: store and broadcast hub.
pub mod state;
