//! Durable local slot holding the last known scoreboard on this device.
//!
//! The cache survives process restarts but is never shared across devices. It is
//! written through on every local mutation and read back when the relay cannot be
//! reached.

use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tempfile::NamedTempFile;
use tokio::{sync::watch, task::JoinHandle, time::interval};
use tracing::{debug, info, warn};

use crate::{
    dao::storage::{CacheError, CacheResult},
    dto::game::GameState,
};

/// Abstraction over the durable local slot.
///
/// Operations are synchronous so a local mutation can be mirrored without
/// suspending. [`LocalCache::subscribe`] reports changes made outside this handle,
/// such as another process on the same device writing the same slot.
pub trait LocalCache: Send + Sync {
    /// Read the cached document; malformed entries are reported as absent.
    fn get(&self) -> CacheResult<Option<GameState>>;
    /// Replace the cached document.
    fn set(&self, state: &GameState) -> CacheResult<()>;
    /// Remove the cached document.
    fn clear(&self) -> CacheResult<()>;
    /// Watch for documents written by someone else.
    fn subscribe(&self) -> watch::Receiver<Option<GameState>>;

    /// Start noticing external writes every `period`, if the backend can see them.
    fn spawn_watcher(self: Arc<Self>, _period: Duration) -> Option<JoinHandle<()>> {
        None
    }
}

/// JSON file backed cache.
pub struct FileCache {
    path: PathBuf,
    /// Last content this handle wrote or observed; guards file access too.
    last_known: Mutex<Option<GameState>>,
    changes: watch::Sender<Option<GameState>>,
}

impl FileCache {
    /// Open a cache stored at `path`. The file is created lazily on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (changes, _rx) = watch::channel(None);
        let cache = Self {
            path,
            last_known: Mutex::new(None),
            changes,
        };

        let initial = cache.read_file().unwrap_or_else(|err| {
            warn!(error = %err, "failed to read local cache on open");
            None
        });
        *cache.lock_last_known() = initial;
        cache
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Poll the backing file and publish documents written by other processes.
    pub fn watch_external(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                cache.poll_external();
            }
        })
    }

    fn poll_external(&self) {
        let mut last_known = self.lock_last_known();
        let current = match self.read_file() {
            Ok(current) => current,
            Err(err) => {
                debug!(error = %err, "local cache poll failed");
                return;
            }
        };

        if current != *last_known {
            debug!(path = %self.path.display(), "local cache changed externally");
            *last_known = current.clone();
            self.changes.send_replace(current);
        }
    }

    fn lock_last_known(&self) -> MutexGuard<'_, Option<GameState>> {
        self.last_known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn read_file(&self) -> CacheResult<Option<GameState>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CacheError::io(&self.path, err)),
        };

        match serde_json::from_str::<GameState>(&contents) {
            Ok(state) => Ok(Some(state)),
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "discarding malformed local cache entry"
                );
                self.remove_file()?;
                Ok(None)
            }
        }
    }

    fn write_file(&self, state: &GameState) -> CacheResult<()> {
        let payload = serde_json::to_vec(state).map_err(CacheError::Encode)?;
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(|err| CacheError::io(parent, err))?;
                parent
            }
            None => Path::new("."),
        };

        // Every write gets its own temp file so concurrent writers sharing the slot
        // never rename each other's half-written document into place.
        let mut tmp = NamedTempFile::new_in(dir).map_err(|err| CacheError::io(dir, err))?;
        tmp.write_all(&payload)
            .map_err(|err| CacheError::io(tmp.path(), err))?;
        tmp.persist(&self.path)
            .map_err(|err| CacheError::io(&self.path, err.error))?;
        Ok(())
    }

    fn remove_file(&self) -> CacheResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CacheError::io(&self.path, err)),
        }
    }
}

impl LocalCache for FileCache {
    fn get(&self) -> CacheResult<Option<GameState>> {
        let mut last_known = self.lock_last_known();
        let current = self.read_file()?;
        *last_known = current.clone();
        Ok(current)
    }

    fn set(&self, state: &GameState) -> CacheResult<()> {
        let mut last_known = self.lock_last_known();
        self.write_file(state)?;
        *last_known = Some(state.clone());
        Ok(())
    }

    fn clear(&self) -> CacheResult<()> {
        let mut last_known = self.lock_last_known();
        self.remove_file()?;
        info!(path = %self.path.display(), "local cache cleared");
        *last_known = None;
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<GameState>> {
        self.changes.subscribe()
    }

    fn spawn_watcher(self: Arc<Self>, period: Duration) -> Option<JoinHandle<()>> {
        Some(self.watch_external(period))
    }
}

/// Process-local cache for ephemeral viewers and tests.
pub struct MemoryCache {
    slot: Mutex<Option<GameState>>,
    changes: watch::Sender<Option<GameState>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        let (changes, _rx) = watch::channel(None);
        Self {
            slot: Mutex::new(None),
            changes,
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<GameState>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCache for MemoryCache {
    fn get(&self) -> CacheResult<Option<GameState>> {
        Ok(self.lock_slot().clone())
    }

    fn set(&self, state: &GameState) -> CacheResult<()> {
        *self.lock_slot() = Some(state.clone());
        Ok(())
    }

    fn clear(&self) -> CacheResult<()> {
        self.lock_slot().take();
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<GameState>> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::dto::game::Team;

    #[test]
    fn file_cache_round_trips_across_handles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");
        let state = GameState::default()
            .start_game("Lions", "Tigers")
            .unwrap()
            .update_score(Team::TeamA, 2);

        FileCache::new(&path).set(&state).unwrap();

        let reopened = FileCache::new(&path);
        assert_eq!(reopened.get().unwrap(), Some(state));
    }

    #[test]
    fn missing_file_is_a_miss() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("absent.json"));
        assert_eq!(cache.get().unwrap(), None);
        cache.clear().unwrap();
    }

    #[test]
    fn corrupt_entry_is_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "{ not json").unwrap();

        let cache = FileCache::new(&path);
        assert_eq!(cache.get().unwrap(), None);
        assert!(!path.exists());
    }

    #[test]
    fn concurrent_writers_never_tear_the_slot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let writers: Vec<_> = (0..4)
            .map(|writer| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let cache = FileCache::new(&path);
                    let mut failures = 0u32;
                    for round in 0..150 {
                        let state = GameState::default()
                            .update_score(Team::TeamA, writer)
                            .update_score(Team::TeamB, round);
                        if cache.set(&state).is_err() {
                            failures += 1;
                        }
                    }
                    failures
                })
            })
            .collect();
        let failures: u32 = writers.into_iter().map(|w| w.join().unwrap()).sum();

        assert_eq!(failures, 0);
        let stored = FileCache::new(&path).get().unwrap().unwrap();
        assert_eq!(stored.score(Team::TeamB), 149);
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn clear_removes_entry() {
        let dir = tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("cache.json"));
        cache.set(&GameState::default()).unwrap();
        cache.clear().unwrap();
        assert_eq!(cache.get().unwrap(), None);
    }

    #[tokio::test]
    async fn external_writes_are_announced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let viewer = Arc::new(FileCache::new(&path));
        let mut changes = viewer.subscribe();
        let watcher = viewer.watch_external(Duration::from_millis(10));

        let controller = FileCache::new(&path);
        let update = GameState::default().update_score(Team::TeamB, 5);
        controller.set(&update).unwrap();

        tokio::time::timeout(Duration::from_secs(2), changes.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*changes.borrow(), Some(update));
        watcher.abort();
    }

    #[tokio::test]
    async fn own_writes_are_not_announced() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(FileCache::new(dir.path().join("cache.json")));
        let changes = cache.subscribe();
        let watcher = cache.watch_external(Duration::from_millis(5));

        cache.set(&GameState::default().update_score(Team::TeamA, 1)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!changes.has_changed().unwrap());
        watcher.abort();
    }

    #[test]
    fn memory_cache_holds_latest_value() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get().unwrap(), None);

        let state = GameState::default().update_score(Team::TeamA, 1);
        cache.set(&state).unwrap();
        assert_eq!(cache.get().unwrap(), Some(state));

        cache.clear().unwrap();
        assert_eq!(cache.get().unwrap(), None);
    }
}
