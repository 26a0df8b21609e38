use super::{ensure_status, AppState};
use crate::broadcast::{spawn_next_door, spawn_response_timeout};
use crate::error::{GameError, GameResult};
use crate::protocol::ServerEvent;
use crate::types::*;
use std::collections::HashSet;
use std::sync::Arc;

/// Next difficulty for a player: good answers make it easier, bad ones harder
pub fn difficulty_for_score(current: u8, score: u32) -> u8 {
    if score > 70 {
        current.saturating_sub(1).max(MIN_DIFFICULTY)
    } else if score < 30 {
        (current + 1).min(MAX_DIFFICULTY)
    } else {
        current.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
    }
}

/// Difficulty of the next shared door from the players' average last score
pub fn round_difficulty(session: &GameSession) -> u8 {
    let last_scores: Vec<u32> = session
        .players
        .iter()
        .filter_map(|p| p.last_score())
        .collect();
    if last_scores.is_empty() {
        return MIN_DIFFICULTY;
    }
    let average = last_scores.iter().sum::<u32>() as f64 / last_scores.len() as f64;
    if average > 70.0 {
        1
    } else if average < 30.0 {
        3
    } else {
        2
    }
}

impl AppState {
    /// Make `door` the current door of an active session and start its timer
    pub async fn present_door(self: &Arc<Self>, session_id: &str, door: Door) -> GameResult<()> {
        {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))?;
            ensure_status(session, GameStatus::Active)?;

            session.current_door = Some(door.clone());
            self.publish(
                session_id,
                ServerEvent::DoorPresented {
                    door: door.clone(),
                    time_limit_secs: self.config.door_time_limit.as_secs(),
                },
            );
            self.publish_snapshot(session);
        }

        tracing::info!(
            "Presented door {} (difficulty {}) to session {}",
            door.door_id,
            door.difficulty,
            session_id
        );
        spawn_response_timeout(
            self.clone(),
            session_id.to_string(),
            door.door_id,
            self.config.door_time_limit,
        );
        Ok(())
    }

    /// Select the next door for a player from their path difficulty and latest score
    pub async fn next_door(&self, player_id: &str, current_score: u32) -> Door {
        let path_and_theme = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter_map(|s| s.player(player_id).map(|p| (s, p)))
                .max_by_key(|(s, _)| (!s.is_completed(), s.created_at))
                .map(|(s, p)| {
                    let answered: HashSet<DoorId> =
                        p.responses.iter().map(|r| r.door_id.clone()).collect();
                    (p.path, s.theme_or_default().to_string(), answered)
                })
        };

        let (difficulty, theme, answered) = match path_and_theme {
            Some((path, theme, answered)) => (
                difficulty_for_score(path.current_difficulty, current_score),
                theme,
                answered,
            ),
            None => (MIN_DIFFICULTY, "general".to_string(), HashSet::new()),
        };
        self.doors.select(&theme, difficulty, &answered).await
    }

    /// Present the following door once a round has been processed
    pub async fn present_next_door(self: &Arc<Self>, session_id: &str) -> GameResult<()> {
        let (theme, difficulty, seen) = {
            let sessions = self.sessions.read().await;
            let session = sessions
                .get(session_id)
                .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))?;
            ensure_status(session, GameStatus::Active)?;
            if session.current_door.is_some() {
                // a door was presented in the meantime
                return Ok(());
            }

            let difficulty = match session.mode {
                GameMode::Multiplayer => round_difficulty(session),
                GameMode::SinglePlayer => session
                    .players
                    .first()
                    .map(|p| p.path.current_difficulty)
                    .unwrap_or(MIN_DIFFICULTY),
            };
            (
                session.theme_or_default().to_string(),
                difficulty,
                session.seen_door_ids(),
            )
        };

        let door = self.doors.select(&theme, difficulty, &seen).await;
        self.present_door(session_id, door).await
    }

    pub(crate) fn schedule_next_door(self: &Arc<Self>, session_id: &str) {
        spawn_next_door(
            self.clone(),
            session_id.to_string(),
            self.config.next_door_delay,
        );
    }
}
