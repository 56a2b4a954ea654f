//! Auto-reconnecting websocket subscription with heartbeat liveness.
//!
//! One `RealtimeChannel` maintains one logical subscription for the
//! lifetime of its consumer. Connection attempts are numbered by an atomic
//! generation; every timer validates its generation before acting, so a
//! heartbeat or reconnect wakeup from a superseded connection is inert.
//! Teardown bumps the generation and signals shutdown, which makes the
//! teardown/reconnect race benign by construction.

use super::{Inbound, UpdateEvent, classify_frame};
use crate::config::Config;
use crate::credentials::CredentialStore;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
}

/// Snapshot of the channel's connection state.
#[derive(Debug, Clone)]
pub struct ChannelStatus {
    pub connection: ConnectionState,
    pub last_heartbeat_at: Option<Instant>,
    pub reconnect_attempt: u32,
}

/// How long to wait before reconnect attempt `n` (1-based).
#[derive(Debug, Clone)]
pub enum ReconnectPolicy {
    /// Constant delay, forever.
    Fixed(Duration),
    /// Doubling delay from `initial` up to `max`, forever.
    Backoff { initial: Duration, max: Duration },
}

impl ReconnectPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            ReconnectPolicy::Fixed(delay) => *delay,
            ReconnectPolicy::Backoff { initial, max } => {
                let exponent = attempt.saturating_sub(1).min(16);
                initial.saturating_mul(2u32.saturating_pow(exponent)).min(*max)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type UpdateCallback = Arc<dyn Fn(&UpdateEvent) + Send + Sync>;

enum SessionEnd {
    /// Socket closed or errored; the run loop schedules a reconnect.
    Closed,
    /// Teardown requested; no reconnect may follow.
    Shutdown,
}

pub struct RealtimeChannel {
    url: String,
    store: Arc<dyn CredentialStore>,
    policy: ReconnectPolicy,
    heartbeat: Duration,
    subscribers: Mutex<Vec<(SubscriptionId, UpdateCallback)>>,
    next_subscriber: AtomicU64,
    status: Mutex<ChannelStatus>,
    generation: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl RealtimeChannel {
    pub fn new(
        url: impl Into<String>,
        store: Arc<dyn CredentialStore>,
        policy: ReconnectPolicy,
        heartbeat: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            url: url.into(),
            store,
            policy,
            heartbeat,
            subscribers: Mutex::new(Vec::new()),
            next_subscriber: AtomicU64::new(1),
            status: Mutex::new(ChannelStatus {
                connection: ConnectionState::Closed,
                last_heartbeat_at: None,
                reconnect_attempt: 0,
            }),
            generation: AtomicU64::new(0),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn CredentialStore>) -> Self {
        let initial = Duration::from_secs(config.realtime.reconnect_delay_secs);
        let policy = if config.realtime.backoff {
            ReconnectPolicy::Backoff {
                initial,
                max: Duration::from_secs(config.realtime.max_reconnect_delay_secs),
            }
        } else {
            ReconnectPolicy::Fixed(initial)
        };
        Self::new(
            config.ws_url(),
            store,
            policy,
            Duration::from_secs(config.realtime.heartbeat_secs),
        )
    }

    // ── Subscriptions ───────────────────────────────────────────────

    /// Register a callback for recognized events. Callbacks fire in
    /// subscription order, exactly once per event.
    pub fn subscribe(
        &self,
        callback: impl Fn(&UpdateEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscriber.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, Arc::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.lock().retain(|(sub, _)| *sub != id);
    }

    pub fn status(&self) -> ChannelStatus {
        self.status.lock().clone()
    }

    /// Stop the channel: no heartbeat, no reconnect after this returns.
    /// Safe to call from any task, any number of times.
    pub fn shutdown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
    }

    // ── Run loop ────────────────────────────────────────────────────

    /// Drive the subscription until [`shutdown`](Self::shutdown).
    ///
    /// Connect failures and closes both land in the same reconnect path;
    /// nothing here is fatal to the host.
    pub async fn run(&self) {
        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            self.set_connection(ConnectionState::Connecting);

            match connect_async(self.connect_url()).await {
                Ok((socket, _)) => {
                    {
                        let mut status = self.status.lock();
                        status.connection = ConnectionState::Open;
                        status.reconnect_attempt = 0;
                    }
                    tracing::info!("realtime channel connected");
                    if let SessionEnd::Shutdown =
                        self.run_session(socket, generation, &mut shutdown_rx).await
                    {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("realtime connect failed: {e}");
                }
            }

            self.set_connection(ConnectionState::Closed);
            if *shutdown_rx.borrow() {
                break;
            }

            let attempt = {
                let mut status = self.status.lock();
                status.reconnect_attempt += 1;
                status.reconnect_attempt
            };
            let delay = self.policy.delay(attempt);
            tracing::debug!("realtime reconnect attempt {attempt} in {delay:?}");

            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    // A wakeup racing teardown must not reconnect.
                    if self.generation.load(Ordering::SeqCst) != generation
                        || *shutdown_rx.borrow()
                    {
                        break;
                    }
                }
                _ = shutdown_rx.changed() => break,
            }
        }
        self.set_connection(ConnectionState::Closed);
        tracing::debug!("realtime channel stopped");
    }

    /// One connection's lifetime: heartbeat probes and inbound dispatch.
    async fn run_session(
        &self,
        socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
        generation: u64,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let (mut write, mut read) = socket.split();
        let mut heartbeat = tokio::time::interval(self.heartbeat);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval fires immediately; the probe cadence starts one period out
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    // A stale generation means this connection was superseded.
                    if self.generation.load(Ordering::SeqCst) != generation {
                        return SessionEnd::Closed;
                    }
                    if let Err(e) = write.send(Message::text("ping")).await {
                        tracing::warn!("heartbeat probe failed: {e}");
                        return SessionEnd::Closed;
                    }
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => self.handle_frame(text.as_str()),
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!("realtime channel closed by server");
                            return SessionEnd::Closed;
                        }
                        // Control and binary frames are not part of the protocol.
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!("realtime socket error: {e}");
                            return SessionEnd::Closed;
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        match classify_frame(text) {
            Inbound::Event(event) => self.dispatch(&event),
            Inbound::Pong => {
                self.status.lock().last_heartbeat_at = Some(Instant::now());
            }
            Inbound::Ignored => {}
        }
    }

    fn dispatch(&self, event: &UpdateEvent) {
        // Snapshot under the lock, invoke outside it, so a callback may
        // subscribe or unsubscribe without deadlocking.
        let subscribers: Vec<UpdateCallback> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();
        for callback in subscribers {
            callback(event);
        }
    }

    /// Connection URL with the current access token as a query credential.
    /// Re-read from the store on every attempt, so a token refreshed while
    /// the channel was down is honored. Anonymous connects are allowed; the
    /// server enforces authorization.
    fn connect_url(&self) -> String {
        match self.store.load() {
            Some(pair) => format!(
                "{}?token={}",
                self.url,
                urlencoding::encode(&pair.access_token)
            ),
            None => self.url.clone(),
        }
    }

    fn set_connection(&self, state: ConnectionState) {
        self.status.lock().connection = state;
    }
}

// ── Tests ───────────────────────────────────────────────────────────
