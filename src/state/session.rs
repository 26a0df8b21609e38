use super::{ensure_not_completed, ensure_status, AppState};
use crate::error::{GameError, GameResult};
use crate::metrics;
use crate::protocol::ServerEvent;
use crate::types::*;
use chrono::Utc;
use std::sync::Arc;

impl AppState {
    /// Create a session in `waiting` with the creator as its first player
    pub async fn create_session(
        &self,
        mode: GameMode,
        creator_id: &str,
        username: &str,
        theme: Option<String>,
    ) -> GameResult<GameSession> {
        let theme = theme.filter(|t| !t.trim().is_empty());
        let session = GameSession {
            session_id: ulid::Ulid::new().to_string(),
            mode,
            theme,
            players: vec![PlayerInfo::new(
                creator_id.to_string(),
                username.to_string(),
            )],
            status: GameStatus::Waiting,
            current_door: None,
            version: 1,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session.clone());
        self.metrics.adjust_gauge(metrics::ACTIVE_SESSIONS, 1);

        tracing::info!(
            "Created {:?} session {} for {}",
            mode,
            session.session_id,
            creator_id
        );
        Ok(session)
    }

    pub async fn join_session(
        &self,
        session_id: &str,
        player_id: &str,
        username: &str,
    ) -> GameResult<GameSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))?;

        ensure_not_completed(session)?;
        if session.status != GameStatus::Waiting {
            return Err(GameError::NotAcceptingPlayers);
        }
        if session.player(player_id).is_some() {
            return Err(GameError::AlreadyInSession(player_id.to_string()));
        }
        match session.mode {
            GameMode::SinglePlayer if !session.players.is_empty() => {
                return Err(GameError::SinglePlayerTaken);
            }
            GameMode::Multiplayer if session.players.len() >= self.config.max_players => {
                return Err(GameError::SessionFull(self.config.max_players));
            }
            _ => {}
        }

        let player = PlayerInfo::new(player_id.to_string(), username.to_string());
        session.players.push(player.clone());
        self.publish(session_id, ServerEvent::PlayerJoined { player });
        self.publish_snapshot(session);

        tracing::info!("Player {} joined session {}", player_id, session_id);
        Ok(session.clone())
    }

    pub async fn get_session(&self, session_id: &str) -> GameResult<GameSession> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))
    }

    pub async fn start_game(&self, session_id: &str) -> GameResult<GameSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))?;

        ensure_status(session, GameStatus::Waiting)?;
        if session.mode == GameMode::Multiplayer && session.players.len() < 2 {
            return Err(GameError::NotEnoughPlayers);
        }

        session.status = GameStatus::Active;
        session.started_at = Some(Utc::now());
        self.publish_snapshot(session);

        tracing::info!(
            "Started session {} with {} players",
            session_id,
            session.players.len()
        );
        Ok(session.clone())
    }

    /// Start the game and present a difficulty-1 door of the session theme
    pub async fn start_game_with_first_door(
        self: &Arc<Self>,
        session_id: &str,
    ) -> GameResult<GameSession> {
        let session = self.start_game(session_id).await?;
        let door = self
            .doors
            .select(
                session.theme_or_default(),
                MIN_DIFFICULTY,
                &session.seen_door_ids(),
            )
            .await;
        self.present_door(session_id, door).await?;
        self.get_session(session_id).await
    }

    /// Evict sessions completed longer ago than the retention window, along
    /// with their event channels and connection entries. Leaderboard entries stay.
    pub async fn prune_completed_sessions(&self) -> usize {
        let retention = self.config.completed_session_retention;
        let now = Utc::now();
        let expired: Vec<SessionId> = {
            let mut sessions = self.sessions.write().await;
            let expired: Vec<SessionId> = sessions
                .values()
                .filter(|s| {
                    s.completed_at
                        .and_then(|at| (now - at).to_std().ok())
                        .is_some_and(|age| age >= retention)
                })
                .map(|s| s.session_id.clone())
                .collect();
            for id in &expired {
                sessions.remove(id);
            }
            expired
        };
        if expired.is_empty() {
            return 0;
        }

        for id in &expired {
            self.hub.remove(id);
        }
        self.connections
            .write()
            .await
            .retain(|(session_id, _), _| !expired.contains(session_id));
        tracing::info!("Evicted {} completed sessions", expired.len());
        expired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_create_session() {
        let state = state();
        let session = state
            .create_session(GameMode::Multiplayer, "alice", "Alice", Some("social".into()))
            .await
            .unwrap();

        assert_eq!(session.status, GameStatus::Waiting);
        assert_eq!(session.players.len(), 1);
        assert!(session.players[0].is_active);
        assert_eq!(session.theme.as_deref(), Some("social"));
        assert_eq!(state.get_session(&session.session_id).await.unwrap(), session);
    }

    #[tokio::test]
    async fn test_blank_theme_is_dropped() {
        let state = state();
        let session = state
            .create_session(GameMode::SinglePlayer, "alice", "Alice", Some("  ".into()))
            .await
            .unwrap();
        assert!(session.theme.is_none());
        assert_eq!(session.theme_or_default(), "general");
    }

    #[tokio::test]
    async fn test_join_publishes_player_then_snapshot() {
        let state = state();
        let session = state
            .create_session(GameMode::Multiplayer, "alice", "Alice", None)
            .await
            .unwrap();
        let (mut rx, _) = state.hub.subscribe(&session.session_id);

        let joined = state
            .join_session(&session.session_id, "bob", "Bob")
            .await
            .unwrap();
        assert_eq!(joined.players.len(), 2);
        assert_eq!(joined.version, 2);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first.event, ServerEvent::PlayerJoined { .. }));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second.event, ServerEvent::SessionUpdate { .. }));
        assert_eq!(second.seq, first.seq + 1);
    }

    #[tokio::test]
    async fn test_join_rejections() {
        let state = state();
        let session = state
            .create_session(GameMode::Multiplayer, "alice", "Alice", None)
            .await
            .unwrap();
        let id = session.session_id;

        assert_eq!(
            state.join_session(&id, "alice", "Alice").await.unwrap_err(),
            GameError::AlreadyInSession("alice".to_string())
        );
        assert!(matches!(
            state.join_session("missing", "bob", "Bob").await,
            Err(GameError::SessionNotFound(_))
        ));

        for i in 1..8 {
            state
                .join_session(&id, &format!("p{}", i), "P")
                .await
                .unwrap();
        }
        assert_eq!(
            state.join_session(&id, "late", "Late").await.unwrap_err(),
            GameError::SessionFull(8)
        );
    }

    #[tokio::test]
    async fn test_join_started_session_fails() {
        let state = state();
        let id = started_pair(&state).await;
        assert_eq!(
            state.join_session(&id, "carol", "Carol").await.unwrap_err(),
            GameError::NotAcceptingPlayers
        );
    }

    #[tokio::test]
    async fn test_single_player_session_is_private() {
        let state = state();
        let session = state
            .create_session(GameMode::SinglePlayer, "alice", "Alice", None)
            .await
            .unwrap();
        assert_eq!(
            state
                .join_session(&session.session_id, "bob", "Bob")
                .await
                .unwrap_err(),
            GameError::SinglePlayerTaken
        );
    }

    #[tokio::test]
    async fn test_start_game_rules() {
        let state = state();
        let multi = state
            .create_session(GameMode::Multiplayer, "alice", "Alice", None)
            .await
            .unwrap();
        assert_eq!(
            state.start_game(&multi.session_id).await.unwrap_err(),
            GameError::NotEnoughPlayers
        );

        let single = state
            .create_session(GameMode::SinglePlayer, "bob", "Bob", None)
            .await
            .unwrap();
        let started = state.start_game(&single.session_id).await.unwrap();
        assert_eq!(started.status, GameStatus::Active);
        assert!(started.started_at.is_some());

        assert!(matches!(
            state.start_game(&single.session_id).await.unwrap_err(),
            GameError::InvalidStatus {
                expected: GameStatus::Waiting,
                actual: GameStatus::Active
            }
        ));
    }

    #[tokio::test]
    async fn test_start_with_first_door_uses_theme() {
        let state = state();
        let session = state
            .create_session(GameMode::SinglePlayer, "alice", "Alice", Some("technology".into()))
            .await
            .unwrap();
        let started = state
            .start_game_with_first_door(&session.session_id)
            .await
            .unwrap();

        let door = started.current_door.unwrap();
        assert_eq!(door.theme, "technology");
        assert_eq!(door.difficulty, 1);
    }

    #[tokio::test]
    async fn test_completed_sessions_are_pruned_after_retention() {
        use crate::config::AppConfig;

        let state = Arc::new(AppState::with_config(AppConfig {
            completed_session_retention: std::time::Duration::ZERO,
            ..quiet_config()
        }));
        let done = started_pair(&state).await;
        let running = started_pair(&state).await;
        state.connect_player(&done, "alice").await.unwrap();
        let (mut rx, _) = state.hub.subscribe(&done);
        {
            let mut sessions = state.sessions.write().await;
            let session = sessions.get_mut(&done).unwrap();
            session.status = GameStatus::Completed;
            session.completed_at = Some(Utc::now());
        }

        assert_eq!(state.prune_completed_sessions().await, 1);
        assert_eq!(
            state.get_session(&done).await.unwrap_err(),
            GameError::SessionNotFound(done.clone())
        );
        assert!(state.get_session(&running).await.is_ok());
        assert_eq!(state.hub.current_seq(&done), 0);
        assert!(matches!(
            rx.recv().await,
            Err(tokio::sync::broadcast::error::RecvError::Closed)
        ));
        assert!(state.active_players(&done).await.is_empty());

        assert_eq!(state.prune_completed_sessions().await, 0);
    }

    #[tokio::test]
    async fn test_recently_completed_sessions_are_kept() {
        let state = state();
        let id = started_pair(&state).await;
        state
            .sessions
            .write()
            .await
            .get_mut(&id)
            .unwrap()
            .completed_at = Some(Utc::now());

        assert_eq!(state.prune_completed_sessions().await, 0);
        assert!(state.get_session(&id).await.is_ok());
    }
}
