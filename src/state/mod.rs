pub mod hub;
pub mod store;

use std::{sync::Arc, time::SystemTime};

use crate::{config::RelayConfig, dto::game::GameState};

pub use self::hub::{BroadcastHub, DeliveryPolicy, ObserverId, ObserverKind, Subscription};
pub use self::store::StateStore;

pub type SharedState = Arc<AppState>;

/// Central relay state: the authoritative store behind its broadcast hub.
pub struct AppState {
    hub: BroadcastHub,
    started_at: SystemTime,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The relay starts from the zero-state document.
    pub fn new(config: &RelayConfig) -> SharedState {
        Self::with_policy(config.delivery)
    }

    /// Construct the state with an explicit delivery policy.
    pub fn with_policy(policy: DeliveryPolicy) -> SharedState {
        Arc::new(Self {
            hub: BroadcastHub::new(StateStore::new(GameState::default()), policy),
            started_at: SystemTime::now(),
        })
    }

    /// Broadcast hub fanning writes out to every observer.
    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    /// Authoritative game state store.
    pub fn store(&self) -> &StateStore {
        self.hub.store()
    }

    /// Moment the relay state was created.
    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }
}
