#![allow(dead_code)]

use std::{
    future::IntoFuture,
    net::SocketAddr,
    sync::mpsc as std_mpsc,
    thread::{self, JoinHandle},
    time::Duration,
};

use scoreboard_relay::{
    dto::game::GameState,
    routes,
    state::{AppState, DeliveryPolicy, SharedState},
};
use tokio::{net::TcpSocket, sync::oneshot};

/// Upper bound for every eventual-consistency wait in the tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// A relay served on its own runtime so tests can kill it like a real process.
pub struct TestRelay {
    addr: SocketAddr,
    state: SharedState,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TestRelay {
    /// Serve a fresh relay on an ephemeral local port.
    pub fn start() -> Self {
        Self::with_policy(DeliveryPolicy::IncludeOrigin)
    }

    pub fn with_policy(policy: DeliveryPolicy) -> Self {
        Self::start_on(local_addr(0), AppState::with_policy(policy))
    }

    /// Serve `state` on `addr`; the port may be one a stopped relay just used.
    pub fn start_on(addr: SocketAddr, state: SharedState) -> Self {
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let served = state.clone();

        let thread = thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async move {
                let socket = TcpSocket::new_v4().unwrap();
                socket.set_reuseaddr(true).unwrap();
                socket.bind(addr).unwrap();
                let listener = socket.listen(128).unwrap();
                ready_tx.send(listener.local_addr().unwrap()).unwrap();

                let app = routes::router(served);
                tokio::select! {
                    result = axum::serve(listener, app.into_make_service()).into_future() => {
                        result.unwrap();
                    }
                    _ = shutdown_rx => {}
                }
            });

            // Dropping the runtime cancels every open connection.
            drop(runtime);
        });

        let addr = ready_rx.recv().unwrap();
        Self {
            addr,
            state,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        }
    }

    /// Serve a relay whose store already holds `initial`.
    pub async fn seeded(addr: SocketAddr, initial: GameState) -> Self {
        let state = AppState::with_policy(DeliveryPolicy::IncludeOrigin);
        state.store().write(initial).await;
        Self::start_on(addr, state)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL clients should use.
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn push_url(&self) -> String {
        format!("ws://{}/socket", self.addr)
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Current stored document.
    pub async fn stored(&self) -> GameState {
        self.state.store().read().await
    }

    /// Wait until the stored document satisfies `predicate`.
    pub async fn wait_for_stored(&self, mut predicate: impl FnMut(&GameState) -> bool) -> GameState {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let stored = self.stored().await;
            if predicate(&stored) {
                return stored;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "relay never stored the expected document, last: {stored:?}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Shut the relay down and close every connection.
    pub fn stop(mut self) {
        self.shutdown_now();
    }

    fn shutdown_now(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}

pub fn local_addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}
