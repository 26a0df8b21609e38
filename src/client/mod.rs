//! Realtime game client.
//!
//! [`RealtimeClient::start`] spawns a background loop that owns the
//! transport, reconnects with backoff when it drops, keeps a reconciled
//! [`SessionStore`] and reports everything to a [`SessionEvents`] handler.
//! The handle talks to the loop over an unbounded channel.

pub mod api;
pub mod backoff;
pub mod sync;
pub mod transport;

pub use api::ApiClient;
pub use backoff::ReconnectPolicy;
pub use sync::{Applied, SessionStore};
pub use transport::{Connector, Transport, WsConnector, WsTransport};

use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::protocol::{ClientMessage, Envelope, PlayerScore, ServerEvent};
use crate::types::*;
use crate::validation::{validate_response, ValidationError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Not connected")]
    NotConnected,
}

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Disconnected,
    /// Gave up after exhausting the reconnect policy
    Failed,
}

/// Display-only link quality from the last heartbeat round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    Unknown,
}

impl ConnectionQuality {
    pub fn from_latency(latency: Option<Duration>) -> Self {
        match latency.map(|l| l.as_millis()) {
            None => ConnectionQuality::Unknown,
            Some(ms) if ms < 100 => ConnectionQuality::Excellent,
            Some(ms) if ms < 300 => ConnectionQuality::Good,
            Some(ms) if ms < 1000 => ConnectionQuality::Fair,
            Some(_) => ConnectionQuality::Poor,
        }
    }
}

/// Callbacks for session events. Every method defaults to a no-op.
///
/// Called from the client's background task, in the order events arrive.
/// Stale and post-completion events are filtered out before they get here.
#[allow(unused_variables)]
pub trait SessionEvents: Send + 'static {
    /// The reconciled snapshot after any change
    fn on_session_update(&mut self, session: &GameSession) {}
    fn on_player_joined(&mut self, player: &PlayerInfo) {}
    fn on_player_left(&mut self, player_id: &str) {}
    fn on_player_reconnected(&mut self, player_id: &str) {}
    fn on_door_presented(&mut self, door: &Door, time_limit_secs: u64) {}
    fn on_response_submitted(&mut self, player_id: &str, response: &PlayerResponse) {}
    fn on_scores_updated(&mut self, door_id: &str, scores: &[PlayerScore]) {}
    fn on_progress_update(&mut self, progress: &SessionProgress) {}
    fn on_player_position_update(&mut self, player_id: &str, position: u32, total_doors: u32) {}
    fn on_leaderboard_update(&mut self, leaderboard: &[PlayerProgress]) {}
    fn on_response_timeout(&mut self, door_id: &str) {}
    fn on_game_completed(&mut self, winner_id: Option<&str>, rankings: &[PlayerRanking]) {}
    fn on_error(&mut self, message: String) {}
    /// Fires once per successful reconnection, never on the first connection
    fn on_connection_restored(&mut self) {}
    fn on_connection_status(&mut self, status: ConnectionStatus) {}
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub reconnect: ReconnectPolicy,
    pub heartbeat_interval: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            heartbeat_interval: Duration::from_secs(15),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

enum Command {
    Send(ClientMessage),
    Shutdown,
}

const NO_LATENCY: u64 = u64::MAX;

struct Shared {
    connected: AtomicBool,
    latency_ms: AtomicU64,
    status: RwLock<ConnectionStatus>,
    store: RwLock<SessionStore>,
}

pub struct RealtimeClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl RealtimeClient {
    /// Spawn the connection loop; the first connect attempt starts immediately
    pub fn start<C, H>(connector: C, handler: H, config: ClientConfig) -> Self
    where
        C: Connector,
        H: SessionEvents,
    {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            connected: AtomicBool::new(false),
            latency_ms: AtomicU64::new(NO_LATENCY),
            status: RwLock::new(ConnectionStatus::Connecting),
            store: RwLock::new(SessionStore::new()),
        });
        let shutdown_timeout = config.shutdown_timeout;
        let task = tokio::spawn(run(connector, handler, config, shared.clone(), cmd_rx));

        Self {
            cmd_tx,
            shared,
            task: Some(task),
            shutdown_timeout,
        }
    }

    /// Fire-and-forget. Returns false, and drops the message, while disconnected.
    pub fn send(&self, message: ClientMessage) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.cmd_tx.send(Command::Send(message)).is_ok()
    }

    /// Validate locally, then send over the realtime connection
    pub fn submit_response(&self, text: &str) -> ClientResult<()> {
        let response = validate_response(text)?.to_string();
        if self.send(ClientMessage::SubmitResponse { response }) {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    pub fn request_sync(&self) -> bool {
        self.send(ClientMessage::RequestSync)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> ConnectionStatus {
        *self.shared.status.read().await
    }

    pub fn latency(&self) -> Option<Duration> {
        match self.shared.latency_ms.load(Ordering::Acquire) {
            NO_LATENCY => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn quality(&self) -> ConnectionQuality {
        ConnectionQuality::from_latency(self.latency())
    }

    pub async fn session(&self) -> Option<GameSession> {
        self.shared.store.read().await.session().cloned()
    }

    pub async fn leaderboard(&self) -> Vec<PlayerProgress> {
        self.shared.store.read().await.leaderboard().to_vec()
    }

    pub async fn last_seq(&self) -> u64 {
        self.shared.store.read().await.last_seq()
    }

    /// Close the transport and wait for the loop to finish
    pub async fn shutdown(&mut self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(self.shutdown_timeout, &mut task)
                .await
                .is_err()
            {
                tracing::warn!("Client loop did not stop in time, aborting");
                task.abort();
            }
        }
        self.shared.connected.store(false, Ordering::Release);
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum Outcome {
    Shutdown,
    Dropped(Option<String>),
}

/// Bookkeeping for one established transport
struct Link {
    /// A welcome snapshot arrived on this transport
    welcomed: bool,
    /// An earlier transport was welcomed, so this welcome restores the connection
    restoring: bool,
}

async fn set_status<H: SessionEvents>(shared: &Shared, handler: &mut H, status: ConnectionStatus) {
    *shared.status.write().await = status;
    handler.on_connection_status(status);
}

async fn run<C, H>(
    connector: C,
    mut handler: H,
    config: ClientConfig,
    shared: Arc<Shared>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
) where
    C: Connector,
    H: SessionEvents,
{
    let mut has_connected = false;
    let mut attempt = 0u32;
    set_status(&shared, &mut handler, ConnectionStatus::Connecting).await;

    loop {
        match connector.connect().await {
            Ok(transport) => {
                shared.connected.store(true, Ordering::Release);
                set_status(&shared, &mut handler, ConnectionStatus::Connected).await;

                let mut link = Link {
                    welcomed: false,
                    restoring: has_connected,
                };
                let outcome = session_loop(
                    transport,
                    &mut handler,
                    &config,
                    &shared,
                    &mut cmd_rx,
                    &mut link,
                )
                .await;
                shared.connected.store(false, Ordering::Release);
                // Only a connection that delivered a welcome counts as healthy
                if link.welcomed {
                    attempt = 0;
                    has_connected = true;
                }
                match outcome {
                    Outcome::Shutdown => {
                        set_status(&shared, &mut handler, ConnectionStatus::Disconnected).await;
                        return;
                    }
                    Outcome::Dropped(reason) => {
                        tracing::warn!("Realtime connection dropped: {:?}", reason);
                        if let Some(reason) = reason {
                            handler.on_error(reason);
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Connect attempt failed: {}", e);
                handler.on_error(e.to_string());
            }
        }

        attempt += 1;
        if !config.reconnect.allows(attempt) {
            tracing::error!("Giving up after {} reconnect attempts", attempt - 1);
            set_status(&shared, &mut handler, ConnectionStatus::Failed).await;
            return;
        }
        set_status(
            &shared,
            &mut handler,
            ConnectionStatus::Reconnecting { attempt },
        )
        .await;

        let deadline = tokio::time::Instant::now() + config.reconnect.delay_for(attempt);
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Send(_)) => {}
                    Some(Command::Shutdown) | None => {
                        set_status(&shared, &mut handler, ConnectionStatus::Disconnected).await;
                        return;
                    }
                },
            }
        }
    }
}

async fn send_message<T: Transport>(transport: &mut T, message: &ClientMessage) -> ClientResult<()> {
    match serde_json::to_string(message) {
        Ok(json) => transport.send(json).await,
        Err(e) => {
            tracing::error!("Failed to serialize client message: {}", e);
            Ok(())
        }
    }
}

async fn session_loop<T, H>(
    mut transport: T,
    handler: &mut H,
    config: &ClientConfig,
    shared: &Shared,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    link: &mut Link,
) -> Outcome
where
    T: Transport,
    H: SessionEvents,
{
    let period = config.heartbeat_interval.max(Duration::from_millis(1));
    let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Send(message)) => {
                    if let Err(e) = send_message(&mut transport, &message).await {
                        return Outcome::Dropped(Some(e.to_string()));
                    }
                }
                Some(Command::Shutdown) | None => {
                    let _ = transport.close().await;
                    return Outcome::Shutdown;
                }
            },

            _ = heartbeat.tick() => {
                let ping = ClientMessage::Ping { sent_at: Utc::now().timestamp_millis() };
                if let Err(e) = send_message(&mut transport, &ping).await {
                    return Outcome::Dropped(Some(e.to_string()));
                }
            }

            incoming = transport.recv() => match incoming {
                Some(Ok(text)) => match serde_json::from_str::<Envelope>(&text) {
                    Ok(envelope) => {
                        if !link.welcomed
                            && matches!(envelope.event, ServerEvent::ConnectionEstablished { .. })
                        {
                            link.welcomed = true;
                            if link.restoring {
                                tracing::info!("Realtime connection restored");
                                handler.on_connection_restored();
                            }
                        }
                        dispatch(&envelope, handler, shared).await
                    }
                    Err(e) => tracing::warn!("Failed to parse server event: {}", e),
                },
                Some(Err(e)) => return Outcome::Dropped(Some(e.to_string())),
                None => return Outcome::Dropped(None),
            },
        }
    }
}

/// Reconcile an envelope and fan it out to the handler
async fn dispatch<H: SessionEvents>(envelope: &Envelope, handler: &mut H, shared: &Shared) {
    let (applied, snapshot) = {
        let mut store = shared.store.write().await;
        let applied = store.apply(envelope);
        let snapshot = if applied.changed() {
            store.session().cloned()
        } else {
            None
        };
        (applied, snapshot)
    };
    if matches!(applied, Applied::Stale | Applied::Ignored) {
        return;
    }

    match &envelope.event {
        ServerEvent::ConnectionEstablished { .. } | ServerEvent::SessionUpdate { .. } => {}
        ServerEvent::PlayerJoined { player } => handler.on_player_joined(player),
        ServerEvent::PlayerLeft { player_id } => handler.on_player_left(player_id),
        ServerEvent::PlayerReconnected { player_id } => handler.on_player_reconnected(player_id),
        ServerEvent::DoorPresented {
            door,
            time_limit_secs,
        } => handler.on_door_presented(door, *time_limit_secs),
        ServerEvent::ResponseSubmitted {
            player_id,
            response,
            ..
        } => handler.on_response_submitted(player_id, response),
        ServerEvent::ScoresUpdated { door_id, scores } => handler.on_scores_updated(door_id, scores),
        ServerEvent::ProgressUpdate { progress } => handler.on_progress_update(progress),
        ServerEvent::PlayerPositionUpdate {
            player_id,
            position,
            total_doors,
        } => handler.on_player_position_update(player_id, *position, *total_doors),
        ServerEvent::LeaderboardUpdate { leaderboard } => handler.on_leaderboard_update(leaderboard),
        ServerEvent::ResponseTimeout { door_id } => handler.on_response_timeout(door_id),
        ServerEvent::GameCompleted {
            winner_id,
            rankings,
            ..
        } => handler.on_game_completed(winner_id.as_deref(), rankings),
        ServerEvent::Pong { sent_at } => {
            let rtt = (Utc::now().timestamp_millis() - sent_at).max(0) as u64;
            shared.latency_ms.store(rtt, Ordering::Release);
        }
        ServerEvent::Error { code, message } => {
            handler.on_error(format!("{}: {}", code, message))
        }
    }

    if let Some(session) = snapshot {
        handler.on_session_update(&session);
    }
}
