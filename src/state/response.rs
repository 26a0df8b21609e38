use super::{ensure_status, leaderboard_of, performance_of, progress_of, rankings_of, AppState};
use crate::error::{GameError, GameResult};
use crate::metrics;
use crate::protocol::{PlayerScore, ServerEvent};
use crate::scoring::{score_or_fallback, ScoreRequest};
use crate::types::*;
use crate::validation::validate_response;
use chrono::Utc;
use std::sync::Arc;

/// Checks shared by the pre-scoring read and the post-scoring write
fn check_can_respond<'a>(
    session: &'a GameSession,
    player_id: &str,
) -> GameResult<&'a Door> {
    ensure_status(session, GameStatus::Active)?;
    let door = session.current_door.as_ref().ok_or(GameError::NoActiveDoor)?;
    let player = session
        .player(player_id)
        .ok_or_else(|| GameError::PlayerNotInSession(player_id.to_string()))?;
    if player.has_responded_to(&door.door_id) {
        return Err(GameError::AlreadyResponded);
    }
    Ok(door)
}

impl AppState {
    /// Score and record a player's answer to the current door.
    ///
    /// Scoring runs without holding the sessions lock; the session is
    /// re-checked before the response is applied.
    pub async fn submit_response(
        self: &Arc<Self>,
        session_id: &str,
        player_id: &str,
        text: &str,
    ) -> GameResult<PlayerResponse> {
        let content = validate_response(text)?.to_string();

        let door = {
            let sessions = self.sessions.read().await;
            let session = sessions
                .get(session_id)
                .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))?;
            check_can_respond(session, player_id)?.clone()
        };

        let request = ScoreRequest {
            response_id: ulid::Ulid::new().to_string(),
            door_content: door.content.clone(),
            response: content.clone(),
        };
        let (scoring_metrics, fallback) = score_or_fallback(self.scorer.as_ref(), &request).await;
        self.metrics
            .increment(metrics::RESPONSES_SCORED_TOTAL, &[("scorer", self.scorer.name())]);
        if fallback {
            self.metrics.increment(metrics::SCORING_FALLBACKS_TOTAL, &[]);
        }

        let response = PlayerResponse {
            response_id: request.response_id,
            door_id: door.door_id.clone(),
            player_id: player_id.to_string(),
            content,
            ai_score: scoring_metrics.total(),
            submitted_at: Utc::now(),
            scoring_metrics,
        };

        let round_done = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))?;
            let current = check_can_respond(session, player_id)?;
            if current.door_id != door.door_id {
                // the round closed while we were scoring
                return Err(GameError::NoActiveDoor);
            }

            let (position, total_doors, total_score) = {
                let player = session
                    .player_mut(player_id)
                    .ok_or_else(|| GameError::PlayerNotInSession(player_id.to_string()))?;
                player.responses.push(response.clone());
                player.total_score += response.ai_score;
                player.current_position += 1;
                player.path.adjust_for_score(response.ai_score);
                (
                    player.current_position,
                    player.path.total_doors,
                    player.total_score,
                )
            };

            self.publish(
                session_id,
                ServerEvent::ResponseSubmitted {
                    player_id: player_id.to_string(),
                    response: response.clone(),
                    total_score,
                },
            );
            self.publish(
                session_id,
                ServerEvent::PlayerPositionUpdate {
                    player_id: player_id.to_string(),
                    position,
                    total_doors,
                },
            );
            self.publish_snapshot(session);

            session.all_active_responded(&door.door_id)
        };

        tracing::info!(
            "Player {} scored {} on door {} in session {}",
            player_id,
            response.ai_score,
            door.door_id,
            session_id
        );

        if round_done {
            self.process_round(session_id, &door.door_id).await?;
        }
        Ok(response)
    }

    /// Close the round for `door_id`: publish scores and progress, then either
    /// complete the game or schedule the next door.
    ///
    /// Does nothing if that door is no longer current.
    pub async fn process_round(self: &Arc<Self>, session_id: &str, door_id: &str) -> GameResult<()> {
        let completed = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(session_id)
                .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))?;
            if session.status != GameStatus::Active
                || session.current_door.as_ref().map(|d| d.door_id.as_str()) != Some(door_id)
            {
                return Ok(());
            }

            session.current_door = None;
            let scores = session
                .players
                .iter()
                .map(|p| PlayerScore {
                    player_id: p.player_id.clone(),
                    username: p.username.clone(),
                    score: p
                        .responses
                        .iter()
                        .find(|r| r.door_id == door_id)
                        .map(|r| r.ai_score),
                    total_score: p.total_score,
                    position: p.current_position,
                })
                .collect();

            self.publish(
                session_id,
                ServerEvent::ScoresUpdated {
                    door_id: door_id.to_string(),
                    scores,
                },
            );
            self.publish(
                session_id,
                ServerEvent::ProgressUpdate {
                    progress: progress_of(session),
                },
            );
            self.publish(
                session_id,
                ServerEvent::LeaderboardUpdate {
                    leaderboard: leaderboard_of(session),
                },
            );

            if session.players.iter().any(|p| p.has_won()) {
                self.complete_locked(session).await;
                true
            } else {
                self.publish_snapshot(session);
                false
            }
        };

        tracing::debug!("Processed round for door {} in session {}", door_id, session_id);
        if !completed {
            self.schedule_next_door(session_id);
        }
        Ok(())
    }

    /// Timer callback: close the round if the door is still open and not everyone answered
    pub async fn handle_response_timeout(
        self: &Arc<Self>,
        session_id: &str,
        door_id: &str,
    ) -> GameResult<()> {
        {
            let sessions = self.sessions.write().await;
            let session = sessions
                .get(session_id)
                .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))?;
            let still_open = session.status == GameStatus::Active
                && session.current_door.as_ref().map(|d| d.door_id.as_str()) == Some(door_id);
            if !still_open || session.all_active_responded(door_id) {
                return Ok(());
            }
            self.publish(
                session_id,
                ServerEvent::ResponseTimeout {
                    door_id: door_id.to_string(),
                },
            );
        }

        tracing::info!("Door {} timed out in session {}", door_id, session_id);
        self.process_round(session_id, door_id).await
    }

    /// Complete a session regardless of player progress
    pub async fn complete_game(&self, session_id: &str) -> GameResult<GameSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))?;
        if session.is_completed() {
            return Err(GameError::SessionCompleted);
        }
        self.complete_locked(session).await;
        Ok(session.clone())
    }

    /// Mark the session completed, record leaderboard entries and announce the result.
    /// The caller holds the sessions write lock.
    async fn complete_locked(&self, session: &mut GameSession) {
        let now = Utc::now();
        session.status = GameStatus::Completed;
        session.completed_at = Some(now);
        session.current_door = None;

        let rankings = rankings_of(session);
        let winner = rankings.iter().find(|r| r.is_winner).or(rankings.first());
        let duration_ms = session
            .started_at
            .map(|started| (now - started).num_milliseconds())
            .unwrap_or(0);

        let entries: Vec<LeaderboardEntry> = session
            .players
            .iter()
            .filter(|p| !p.responses.is_empty())
            .map(|p| LeaderboardEntry {
                player_id: p.player_id.clone(),
                username: p.username.clone(),
                completion_time_ms: duration_ms,
                total_score: p.total_score,
                average_score: p.average_score(),
                doors_completed: p.responses.len() as u32,
                is_winner: p.has_won(),
                game_mode: session.mode,
                theme: session.theme.clone(),
                session_id: session.session_id.clone(),
                completed_at: now,
            })
            .collect();
        let recorded = entries.len();
        self.leaderboard.write().await.extend(entries);

        self.publish_snapshot(session);
        self.publish(
            &session.session_id,
            ServerEvent::GameCompleted {
                winner_id: winner.map(|w| w.player_id.clone()),
                winner_username: winner.map(|w| w.username.clone()),
                rankings: rankings.clone(),
                performance_stats: performance_of(session),
                duration_ms,
            },
        );
        self.publish(
            &session.session_id,
            ServerEvent::LeaderboardUpdate {
                leaderboard: leaderboard_of(session),
            },
        );

        self.metrics.increment(metrics::GAMES_COMPLETED_TOTAL, &[]);
        self.metrics.adjust_gauge(metrics::ACTIVE_SESSIONS, -1);
        tracing::info!(
            "Session {} completed, winner {:?}, {} leaderboard entries",
            session.session_id,
            winner.map(|w| w.username.as_str()),
            recorded
        );
    }
}
