//! Viewer-side replica of the scoreboard.
//!
//! A [`SyncClient`] keeps the local copy, mirrors it to a durable
//! [`LocalCache`](crate::dao::local_cache::LocalCache), and exchanges documents
//! with the relay through a [`TransportChain`].

/// Single-slot coalescing send queue.
pub mod queue;
/// Backoff policy for the push link.
pub mod reconnect;
/// The replica itself.
pub mod sync_client;
/// Transport strategies and their priority chain.
pub mod transport;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use sync_client::{ConnectionStatus, SyncClient, TransportFactory};
pub use transport::{
    Delivery, HostedStoreTransport, HttpTransport, PushTransport, Tier, Transport,
    TransportChain, TransportError, TransportEvent, TransportResult,
};

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
