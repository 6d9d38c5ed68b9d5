//! Local replica of the scoreboard kept in sync with the relay.

use std::{
    convert::Infallible,
    pin::pin,
    sync::{
        Arc, Mutex, PoisonError, RwLock,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
};

use tokio::{
    sync::{Notify, mpsc, watch},
    task::JoinHandle,
    time::{MissedTickBehavior, interval, sleep, timeout},
};
use tracing::{debug, info, warn};
use validator::Validate;

use crate::{
    client::{
        lock,
        queue::UpdateQueue,
        reconnect::ReconnectPolicy,
        transport::{
            Tier, Transport, TransportChain, TransportError, TransportEvent, TransportResult,
        },
    },
    config::{ClientConfig, non_zero_interval, normalize_endpoint},
    dao::local_cache::LocalCache,
    dto::game::{GameError, GameState},
};

/// Reachability of the relay as shown to the UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The push channel to the relay is open.
    Connected,
    /// Changes are kept locally until the relay is reachable again.
    #[default]
    Offline,
}

/// Builds the transport chain for a relay endpoint.
pub type TransportFactory =
    Arc<dyn Fn(&str, &ClientConfig) -> TransportResult<TransportChain> + Send + Sync>;

struct Inner {
    config: ClientConfig,
    cache: Arc<dyn LocalCache>,
    factory: TransportFactory,
    state: watch::Sender<GameState>,
    status: watch::Sender<ConnectionStatus>,
    queue: UpdateQueue,
    drain_wake: Notify,
    link_lost: Notify,
    endpoint: RwLock<String>,
    chain: RwLock<Arc<TransportChain>>,
    reconnect_attempts: AtomicU32,
    /// Bumped on every remote update; lets a slow fetch detect it was overtaken.
    remote_epoch: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Client-side replica: applies local edits immediately and syncs them in the
/// background, while remote updates overwrite the local copy.
///
/// Cloning is cheap and every clone drives the same replica.
#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<Inner>,
}

impl SyncClient {
    /// Build a client talking to `config.server` through the standard transports.
    pub fn new(config: ClientConfig, cache: Arc<dyn LocalCache>) -> TransportResult<Self> {
        let factory: TransportFactory = Arc::new(TransportChain::for_endpoint);
        Self::with_factory(config, cache, factory)
    }

    /// Build a client whose transports are produced by `factory`.
    pub fn with_factory(
        mut config: ClientConfig,
        cache: Arc<dyn LocalCache>,
        factory: TransportFactory,
    ) -> TransportResult<Self> {
        if config.drain_interval.is_zero() {
            warn!("drain interval must be non-zero; using the default");
        }
        config.drain_interval = non_zero_interval(
            config.drain_interval,
            ClientConfig::default().drain_interval,
        );
        let endpoint = normalize_endpoint(&config.server);
        let chain = factory(&endpoint, &config)?;
        let (state, _) = watch::channel(GameState::default());
        let (status, _) = watch::channel(ConnectionStatus::Offline);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                cache,
                factory,
                state,
                status,
                queue: UpdateQueue::new(),
                drain_wake: Notify::new(),
                link_lost: Notify::new(),
                endpoint: RwLock::new(endpoint),
                chain: RwLock::new(Arc::new(chain)),
                reconnect_attempts: AtomicU32::new(0),
                remote_epoch: AtomicU64::new(0),
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Current local copy.
    pub fn state(&self) -> GameState {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every change of the local copy.
    pub fn watch_state(&self) -> watch::Receiver<GameState> {
        self.inner.state.subscribe()
    }

    /// Whether the relay is currently reachable.
    pub fn connection_status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    /// Receiver notified when the relay becomes reachable or unreachable.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    /// Failed push connection attempts in the current retry window.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Relay endpoint currently in use.
    pub fn endpoint(&self) -> String {
        self.inner
            .endpoint
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// True while a local change has not been delivered yet.
    pub fn is_sync_pending(&self) -> bool {
        self.inner.queue.has_pending()
    }

    fn chain(&self) -> Arc<TransportChain> {
        Arc::clone(
            &self
                .inner
                .chain
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    fn set_status(&self, status: ConnectionStatus) -> bool {
        self.inner.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        })
    }

    /// Apply `mutator` to the local copy, persist it, and queue it for sync.
    ///
    /// Never waits on the network; returns the new value.
    pub fn apply_local_change<F>(&self, mutator: F) -> GameState
    where
        F: FnOnce(&GameState) -> GameState,
    {
        match self.commit(|current| Ok::<_, Infallible>(mutator(current))) {
            Ok(state) => state,
            Err(never) => match never {},
        }
    }

    /// Like [`SyncClient::apply_local_change`] for mutators with preconditions.
    /// A rejected change leaves the local copy and the queue untouched.
    pub fn try_apply_local_change<F>(&self, mutator: F) -> Result<GameState, GameError>
    where
        F: FnOnce(&GameState) -> Result<GameState, GameError>,
    {
        self.commit(mutator)
    }

    fn commit<E>(
        &self,
        mutator: impl FnOnce(&GameState) -> Result<GameState, E>,
    ) -> Result<GameState, E> {
        let mut outcome = None;
        self.inner
            .state
            .send_if_modified(|current| match mutator(current) {
                Ok(next) => {
                    self.record_local(&next);
                    *current = next.clone();
                    outcome = Some(Ok(next));
                    true
                }
                Err(err) => {
                    outcome = Some(Err(err));
                    false
                }
            });

        let outcome = outcome.unwrap_or_else(|| Ok(self.state()));
        if outcome.is_ok() {
            self.inner.drain_wake.notify_one();
        }
        outcome
    }

    fn record_local(&self, state: &GameState) {
        if let Err(errors) = state.validate() {
            warn!(error = %errors, "local change violates scoreboard invariants");
        }
        self.persist(state);
        self.inner.queue.enqueue(state.clone());
    }

    fn persist(&self, state: &GameState) {
        if let Err(err) = self.inner.cache.set(state) {
            warn!(error = %err, "failed to write local cache");
        }
    }

    /// Queue `state` for delivery, replacing anything still pending.
    pub fn enqueue_for_sync(&self, state: GameState) {
        self.inner.queue.enqueue(state);
        self.inner.drain_wake.notify_one();
    }

    /// Try to deliver the pending document once. Returns `true` when it was delivered.
    pub async fn drain_queue(&self) -> bool {
        let Some(ticket) = self.inner.queue.begin_send() else {
            return false;
        };
        let seq = ticket.seq();
        let chain = self.chain();
        let outcome = chain.send(ticket.state()).await;
        ticket.finish(outcome.is_ok());

        match outcome {
            Ok(delivery) => {
                debug!(seq, tier = ?delivery.tier, via = ?delivery.delivered_by, "local change synced");
                if !chain.has_persistent() {
                    self.set_status(ConnectionStatus::Connected);
                }
                true
            }
            Err(err) => {
                if self.set_status(ConnectionStatus::Offline) {
                    warn!(seq, error = %err, "relay unreachable; keeping change queued");
                } else {
                    debug!(seq, error = %err, "sync attempt failed");
                }
                false
            }
        }
    }

    /// Replace the local copy with a document received from elsewhere.
    ///
    /// Last write wins: an unsent local change is not merged.
    pub fn on_remote_update(&self, state: GameState) {
        self.inner.remote_epoch.fetch_add(1, Ordering::SeqCst);
        let changed = self.inner.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state.clone();
                true
            }
        });

        if changed {
            debug!("applied remote scoreboard update");
            self.persist(&state);
        }
    }

    /// Populate the local copy: relay first, then the local cache, then the
    /// fallback store. Leaves the current value when every source is empty.
    pub async fn load_initial(&self) -> GameState {
        let chain = self.chain();

        match chain.fetch_tier(Tier::Primary).await {
            Ok(remote) => {
                self.set_status(ConnectionStatus::Connected);
                if let Some(state) = remote {
                    info!("loaded scoreboard from relay");
                    self.on_remote_update(state);
                }
                return self.state();
            }
            Err(err) => {
                self.set_status(ConnectionStatus::Offline);
                warn!(error = %err, "relay unreachable; falling back to local cache");
            }
        }

        match self.inner.cache.get() {
            Ok(Some(state)) => {
                info!("restored scoreboard from local cache");
                self.on_remote_update(state);
                return self.state();
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, "failed to read local cache"),
        }

        match chain.fetch_tier(Tier::Fallback).await {
            Ok(Some(state)) => {
                info!("loaded scoreboard from hosted store");
                self.on_remote_update(state);
            }
            Ok(None) | Err(TransportError::Exhausted) => {}
            Err(err) => warn!(error = %err, "failed to read hosted store"),
        }

        self.state()
    }

    /// Load the initial value and start the background workers.
    pub async fn start(&self) {
        self.abort_tasks();

        let chain = self.chain();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        chain.subscribe_all(events_tx);
        let cache_changes = self.inner.cache.subscribe();

        self.load_initial().await;

        let mut tasks = vec![
            tokio::spawn(self.clone().pump_events(events_rx)),
            tokio::spawn(self.clone().run_drain()),
            tokio::spawn(self.clone().follow_cache(cache_changes)),
        ];
        if let Some(period) = self.inner.config.cache_watch_interval {
            if let Some(watcher) = Arc::clone(&self.inner.cache).spawn_watcher(period) {
                tasks.push(watcher);
            }
        }

        for transport in chain.transports() {
            if transport.is_persistent() {
                tasks.push(tokio::spawn(
                    self.clone().supervise(Arc::clone(transport)),
                ));
            } else if let Err(err) = transport.connect().await {
                warn!(transport = transport.name(), error = %err, "failed to connect transport");
            }
        }

        lock(&self.inner.tasks).extend(tasks);
        info!(endpoint = %self.endpoint(), "sync client started");
    }

    /// Stop the workers and close every transport. Pending changes stay queued.
    pub async fn stop(&self) {
        self.abort_tasks();
        self.chain().disconnect_all().await;
        self.set_status(ConnectionStatus::Offline);
        info!("sync client stopped");
    }

    /// Point the client at another relay: rebuild the transports, reload, restart.
    ///
    /// A change still queued for the previous relay is dropped.
    pub async fn set_endpoint(&self, endpoint: &str) -> TransportResult<()> {
        let endpoint = normalize_endpoint(endpoint);
        let chain = (self.inner.factory)(&endpoint, &self.inner.config)?;

        self.stop().await;
        self.inner.queue.clear();
        *self
            .inner
            .endpoint
            .write()
            .unwrap_or_else(PoisonError::into_inner) = endpoint.clone();
        *self
            .inner
            .chain
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(chain);
        info!(endpoint = %endpoint, "switched relay endpoint");

        self.start().await;
        Ok(())
    }

    fn abort_tasks(&self) {
        for task in lock(&self.inner.tasks).drain(..) {
            task.abort();
        }
    }

    async fn pump_events(self, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Remote { transport, state } => {
                    debug!(transport, "remote update received");
                    self.on_remote_update(state);
                }
                TransportEvent::Connected { transport } => {
                    debug!(transport, "transport link up");
                }
                TransportEvent::Disconnected { transport } => {
                    debug!(transport, "transport link down");
                    self.inner.link_lost.notify_waiters();
                }
            }
        }
    }

    async fn run_drain(self) {
        let mut ticker = interval(self.inner.config.drain_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.inner.drain_wake.notified() => {}
            }
            self.drain_queue().await;
        }
    }

    /// Apply documents another process wrote to the shared cache.
    async fn follow_cache(self, mut changes: watch::Receiver<Option<GameState>>) {
        while changes.changed().await.is_ok() {
            let Some(state) = changes.borrow_and_update().clone() else {
                continue;
            };
            if state != self.state() {
                info!("applying scoreboard written by another process");
                self.on_remote_update(state);
            }
        }
    }

    /// Keep a persistent transport connected, backing off between failures.
    async fn supervise(self, transport: Arc<dyn Transport>) {
        let mut policy = ReconnectPolicy::new(self.inner.config.reconnect.clone());
        let connect_timeout = self.inner.config.connect_timeout;

        loop {
            let attempt = match timeout(connect_timeout, transport.connect()).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(connect_timeout)),
            };

            match attempt {
                Ok(()) => {
                    policy.reset();
                    self.inner.reconnect_attempts.store(0, Ordering::SeqCst);
                    self.set_status(ConnectionStatus::Connected);
                    info!(transport = transport.name(), "connected to relay");

                    self.resync().await;
                    self.wait_for_link_loss(transport.as_ref()).await;

                    self.set_status(ConnectionStatus::Offline);
                    warn!(transport = transport.name(), "lost connection to relay");
                }
                Err(err) => {
                    self.set_status(ConnectionStatus::Offline);
                    let backoff = policy.record_failure();
                    self.inner
                        .reconnect_attempts
                        .store(backoff.attempt, Ordering::SeqCst);
                    warn!(
                        transport = transport.name(),
                        attempt = backoff.attempt,
                        delay = ?backoff.delay,
                        cooldown = backoff.cooldown,
                        error = %err,
                        "connection attempt failed"
                    );
                    sleep(backoff.delay).await;
                }
            }
        }
    }

    async fn wait_for_link_loss(&self, transport: &dyn Transport) {
        loop {
            let mut notified = pin!(self.inner.link_lost.notified());
            notified.as_mut().enable();
            if !transport.is_connected() {
                return;
            }
            notified.await;
        }
    }

    /// Replace the local copy with the relay's value after reconnecting, unless a
    /// pushed update arrived while the fetch was in flight.
    async fn resync(&self) {
        let epoch = self.inner.remote_epoch.load(Ordering::SeqCst);
        match self.chain().fetch_tier(Tier::Primary).await {
            Ok(Some(state)) if self.inner.remote_epoch.load(Ordering::SeqCst) == epoch => {
                info!("resynchronized scoreboard from relay");
                self.on_remote_update(state);
            }
            Ok(Some(_)) => debug!("skipping stale resync; a newer update already arrived"),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "failed to resynchronize from relay"),
        }
    }
}
