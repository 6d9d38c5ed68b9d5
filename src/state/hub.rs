use dashmap::DashMap;
use serde::Deserialize;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{dto::game::GameState, state::store::StateStore};

/// Identifier handed out to every subscribed observer.
pub type ObserverId = Uuid;

/// Whether the writer of an update also receives the broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Echo the stored value back to the writer too.
    #[default]
    IncludeOrigin,
    /// Skip the writer; it already holds the value locally.
    ///
    /// Only push-channel writes carry an origin. A `POST /api/game` has none, so its
    /// copy still reaches every socket, including a sync client that sent the same
    /// change over both channels.
    ExcludeOrigin,
}

/// Kind of channel an observer is attached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverKind {
    /// Bidirectional push socket.
    PushSocket,
    /// Read-only server-sent event stream.
    EventStream,
}

#[derive(Clone)]
/// Handle used to push documents to a connected observer.
struct ObserverConnection {
    kind: ObserverKind,
    tx: mpsc::UnboundedSender<GameState>,
}

/// A live subscription: its identifier and the receiving end of its FIFO channel.
pub struct Subscription {
    pub id: ObserverId,
    pub kind: ObserverKind,
    pub receiver: mpsc::UnboundedReceiver<GameState>,
}

/// Fans every accepted write out to the connected observers.
///
/// Publishing writes the [`StateStore`] first and then delivers the stored value,
/// both under one gate so concurrent publishers never interleave a write with
/// another publisher's fan-out.
pub struct BroadcastHub {
    store: StateStore,
    observers: DashMap<ObserverId, ObserverConnection>,
    policy: DeliveryPolicy,
    write_gate: Mutex<()>,
}

impl BroadcastHub {
    /// Build a hub around `store` using the given delivery policy.
    pub fn new(store: StateStore, policy: DeliveryPolicy) -> Self {
        Self {
            store,
            observers: DashMap::new(),
            policy,
            write_gate: Mutex::new(()),
        }
    }

    /// Authoritative store backing this hub.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Delivery policy applied on publish.
    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    /// Number of currently registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Register a new observer that receives every subsequent publish.
    pub fn subscribe(&self, kind: ObserverKind) -> Subscription {
        let (tx, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.observers.insert(id, ObserverConnection { kind, tx });
        debug!(observer = %id, ?kind, "observer subscribed");
        Subscription { id, kind, receiver }
    }

    /// Register an observer together with the value it must start from.
    ///
    /// Holding the write gate guarantees no publish lands between the snapshot and
    /// the registration, so the observer never misses or reorders a write.
    pub async fn subscribe_with_snapshot(&self, kind: ObserverKind) -> (Subscription, GameState) {
        let _gate = self.write_gate.lock().await;
        let subscription = self.subscribe(kind);
        let snapshot = self.store.read().await;
        (subscription, snapshot)
    }

    /// Drop an observer; further publishes skip it.
    pub fn unsubscribe(&self, id: &ObserverId) {
        if self.observers.remove(id).is_some() {
            debug!(observer = %id, "observer unsubscribed");
        }
    }

    /// Store `state` and deliver the stored value according to the policy.
    ///
    /// `origin` identifies the writing observer, if the write came through one.
    /// Returns the stored value.
    pub async fn publish(&self, origin: Option<ObserverId>, state: GameState) -> GameState {
        if let Err(errors) = state.validate() {
            warn!(origin = ?origin, %errors, "storing game state that breaks domain invariants");
        }

        let _gate = self.write_gate.lock().await;
        let stored = self.store.write(state).await;

        let mut dead = Vec::new();
        for entry in self.observers.iter() {
            let id = *entry.key();
            if self.policy == DeliveryPolicy::ExcludeOrigin && origin == Some(id) {
                continue;
            }
            if entry.value().tx.send(stored.clone()).is_err() {
                dead.push((id, entry.value().kind));
            }
        }

        // Removal happens after iteration; DashMap shards stay locked while iterating.
        for (id, kind) in dead {
            warn!(observer = %id, ?kind, "pruning dead observer");
            self.observers.remove(&id);
        }

        stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::game::Team;

    fn hub(policy: DeliveryPolicy) -> BroadcastHub {
        BroadcastHub::new(StateStore::default(), policy)
    }

    #[tokio::test]
    async fn publish_stores_then_delivers_to_everyone_by_default() {
        let hub = hub(DeliveryPolicy::default());
        let mut writer = hub.subscribe(ObserverKind::PushSocket);
        let mut viewer = hub.subscribe(ObserverKind::EventStream);

        let update = GameState::default().update_score(Team::TeamA, 2);
        let stored = hub.publish(Some(writer.id), update.clone()).await;

        assert_eq!(stored, update);
        assert_eq!(hub.store().read().await, update);
        assert_eq!(writer.receiver.try_recv().unwrap(), update);
        assert_eq!(viewer.receiver.try_recv().unwrap(), update);
    }

    #[tokio::test]
    async fn exclude_origin_skips_the_writer() {
        let hub = hub(DeliveryPolicy::ExcludeOrigin);
        let mut writer = hub.subscribe(ObserverKind::PushSocket);
        let mut viewer = hub.subscribe(ObserverKind::PushSocket);

        let update = GameState::default().update_score(Team::TeamB, 1);
        hub.publish(Some(writer.id), update.clone()).await;

        assert!(writer.receiver.try_recv().is_err());
        assert_eq!(viewer.receiver.try_recv().unwrap(), update);
    }

    #[tokio::test]
    async fn exclude_origin_cannot_skip_writes_without_origin() {
        let hub = hub(DeliveryPolicy::ExcludeOrigin);
        let mut writer = hub.subscribe(ObserverKind::PushSocket);

        let update = GameState::default().update_score(Team::TeamA, 5);
        hub.publish(Some(writer.id), update.clone()).await;
        hub.publish(None, update.clone()).await;

        assert_eq!(writer.receiver.try_recv().unwrap(), update);
        assert!(writer.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_observers_are_pruned_without_blocking_others() {
        let hub = hub(DeliveryPolicy::default());
        let dead = hub.subscribe(ObserverKind::PushSocket);
        let mut alive = hub.subscribe(ObserverKind::PushSocket);
        drop(dead.receiver);
        assert_eq!(hub.observer_count(), 2);

        hub.publish(None, GameState::default()).await;

        assert_eq!(hub.observer_count(), 1);
        assert!(alive.receiver.try_recv().is_ok());
    }

    #[tokio::test]
    async fn per_observer_delivery_is_fifo() {
        let hub = hub(DeliveryPolicy::default());
        let mut viewer = hub.subscribe(ObserverKind::PushSocket);

        for points in 1..=3 {
            hub.publish(None, GameState::default().update_score(Team::TeamA, points))
                .await;
        }

        for points in 1..=3 {
            assert_eq!(viewer.receiver.try_recv().unwrap().score(Team::TeamA), points);
        }
    }

    #[tokio::test]
    async fn snapshot_subscription_sees_latest_write() {
        let hub = hub(DeliveryPolicy::default());
        let latest = GameState::default().update_score(Team::TeamA, 9);
        hub.publish(None, GameState::default()).await;
        hub.publish(None, latest.clone()).await;

        let (mut subscription, snapshot) =
            hub.subscribe_with_snapshot(ObserverKind::PushSocket).await;
        assert_eq!(snapshot, latest);
        assert!(subscription.receiver.try_recv().is_err());

        hub.unsubscribe(&subscription.id);
        assert_eq!(hub.observer_count(), 0);
    }
}
