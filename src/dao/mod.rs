/// Durable per-device mirror of the scoreboard.
pub mod local_cache;
/// Error types shared by the cache backends.
pub mod storage;
