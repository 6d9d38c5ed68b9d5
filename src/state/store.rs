use tokio::sync::RwLock;

use crate::dto::game::GameState;

/// Holds the single authoritative [`GameState`] for the lifetime of the relay process.
///
/// Writes replace the whole document; there is no merge and no version check, so
/// the last completed write wins.
#[derive(Debug, Default)]
pub struct StateStore {
    value: RwLock<GameState>,
}

impl StateStore {
    /// Create a store primed with `initial`.
    pub fn new(initial: GameState) -> Self {
        Self {
            value: RwLock::new(initial),
        }
    }

    /// Snapshot the current document.
    pub async fn read(&self) -> GameState {
        self.value.read().await.clone()
    }

    /// Replace the document and return the stored value.
    pub async fn write(&self, next: GameState) -> GameState {
        let mut guard = self.value.write().await;
        *guard = next;
        guard.clone()
    }
}
