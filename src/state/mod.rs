mod connection;
mod door;
mod leaderboard;
mod progress;
mod response;
mod session;

pub use connection::ConnectionInfo;
pub use door::{difficulty_for_score, round_difficulty};
pub use leaderboard::RankCategory;
pub use progress::{leaderboard_of, performance_of, progress_of, rankings_of};

use crate::broadcast::EventHub;
use crate::config::AppConfig;
use crate::doors::{DoorGenerator, DoorStore};
use crate::error::{GameError, GameResult};
use crate::metrics::{self, Metrics};
use crate::protocol::{Envelope, ServerEvent};
use crate::reports::ErrorReportLog;
use crate::scoring::{HeuristicScorer, Scorer};
use crate::types::*;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state
pub struct AppState {
    pub config: AppConfig,
    pub sessions: RwLock<HashMap<SessionId, GameSession>>,
    /// Per-session event fan-out
    pub hub: EventHub,
    pub doors: DoorStore,
    /// Completed games, one entry per player
    pub leaderboard: RwLock<Vec<LeaderboardEntry>>,
    pub connections: RwLock<HashMap<(SessionId, PlayerId), ConnectionInfo>>,
    pub error_reports: RwLock<ErrorReportLog>,
    pub metrics: Arc<Metrics>,
    pub scorer: Arc<dyn Scorer>,
}

impl AppState {
    pub fn new(config: AppConfig, scorer: Arc<dyn Scorer>, metrics: Arc<Metrics>) -> Self {
        let doors = DoorStore::new(config.door_cache_ttl);
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            hub: EventHub::new(),
            doors,
            leaderboard: RwLock::new(Vec::new()),
            connections: RwLock::new(HashMap::new()),
            error_reports: RwLock::new(ErrorReportLog::default()),
            metrics,
            scorer,
        }
    }

    /// State with the local scorer and a fresh metrics registry
    pub fn with_config(config: AppConfig) -> Self {
        Self::new(config, Arc::new(HeuristicScorer), Arc::new(Metrics::new()))
    }

    pub fn with_door_generator(mut self, generator: Arc<dyn DoorGenerator>) -> Self {
        self.doors = self.doors.with_generator(generator);
        self
    }

    /// Publish an event for a session. Call while holding the sessions write lock.
    pub(crate) fn publish(&self, session_id: &str, event: ServerEvent) -> Envelope {
        let kind = event.kind();
        let envelope = self.hub.publish(session_id, event);
        self.metrics
            .increment(metrics::EVENTS_PUBLISHED_TOTAL, &[("type", kind)]);
        tracing::debug!("Published {} #{} to session {}", kind, envelope.seq, session_id);
        envelope
    }

    /// Bump the session version and publish the full snapshot
    pub(crate) fn publish_snapshot(&self, session: &mut GameSession) {
        session.version += 1;
        self.publish(
            &session.session_id,
            ServerEvent::SessionUpdate {
                session: session.clone(),
            },
        );
    }

    /// Build a welcome snapshot at the current sequence number
    pub async fn welcome(&self, session_id: &str, player_id: &str) -> GameResult<Envelope> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))?;
        if session.player(player_id).is_none() {
            return Err(GameError::PlayerNotInSession(player_id.to_string()));
        }
        Ok(Envelope::new(
            session_id,
            self.hub.current_seq(session_id),
            ServerEvent::ConnectionEstablished {
                player_id: player_id.to_string(),
                session: session.clone(),
            },
        ))
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_config(AppConfig::default())
    }
}

/// Reject mutations on completed sessions
pub(crate) fn ensure_not_completed(session: &GameSession) -> GameResult<()> {
    if session.is_completed() {
        return Err(GameError::SessionCompleted);
    }
    Ok(())
}

pub(crate) fn ensure_status(session: &GameSession, expected: GameStatus) -> GameResult<()> {
    ensure_not_completed(session)?;
    if session.status != expected {
        return Err(GameError::InvalidStatus {
            expected,
            actual: session.status,
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::time::Duration;

    /// Config with timers long enough that they never fire during a test
    pub fn quiet_config() -> AppConfig {
        AppConfig {
            door_time_limit: Duration::from_secs(3600),
            next_door_delay: Duration::from_secs(3600),
            ..AppConfig::default()
        }
    }

    pub fn state() -> Arc<AppState> {
        Arc::new(AppState::with_config(quiet_config()))
    }

    /// Active multiplayer session with alice and bob
    pub async fn started_pair(state: &Arc<AppState>) -> String {
        let session = state
            .create_session(GameMode::Multiplayer, "alice", "Alice", None)
            .await
            .unwrap();
        state
            .join_session(&session.session_id, "bob", "Bob")
            .await
            .unwrap();
        state
            .start_game_with_first_door(&session.session_id)
            .await
            .unwrap();
        session.session_id
    }
}
