use super::AppState;
use crate::error::{GameError, GameResult};
use crate::metrics;
use crate::protocol::{Envelope, ServerEvent};
use crate::types::*;
use std::time::Instant;
use tokio::sync::broadcast;

/// Registry entry for one player's realtime connection(s) to a session
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// Open sockets; a player may have more than one tab open
    pub open: u32,
    pub connected_at: Instant,
    pub last_seen: Instant,
    pub disconnected_at: Option<Instant>,
}

impl ConnectionInfo {
    pub fn is_connected(&self) -> bool {
        self.open > 0
    }
}

impl AppState {
    /// Subscribe to a session's events and build the welcome snapshot.
    ///
    /// Both happen under the sessions read lock, so the welcome's `seq` is
    /// exactly the last event published before the subscription.
    pub async fn subscribe(
        &self,
        session_id: &str,
        player_id: &str,
    ) -> GameResult<(broadcast::Receiver<Envelope>, Envelope)> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))?;
        if session.player(player_id).is_none() {
            return Err(GameError::PlayerNotInSession(player_id.to_string()));
        }

        let (rx, seq) = self.hub.subscribe(session_id);
        let welcome = Envelope::new(
            session_id,
            seq,
            ServerEvent::ConnectionEstablished {
                player_id: player_id.to_string(),
                session: session.clone(),
            },
        );
        Ok((rx, welcome))
    }

    /// Register a realtime connection and mark the player active.
    ///
    /// Returns true when this is a reconnect within the disconnect timeout.
    pub async fn connect_player(&self, session_id: &str, player_id: &str) -> GameResult<bool> {
        {
            let sessions = self.sessions.read().await;
            let session = sessions
                .get(session_id)
                .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))?;
            if session.player(player_id).is_none() {
                return Err(GameError::PlayerNotInSession(player_id.to_string()));
            }
        }

        let now = Instant::now();
        let reconnect = {
            let mut connections = self.connections.write().await;
            let key = (session_id.to_string(), player_id.to_string());
            let entry = connections.entry(key).or_insert_with(|| ConnectionInfo {
                open: 0,
                connected_at: now,
                last_seen: now,
                disconnected_at: None,
            });
            let reconnect = entry
                .disconnected_at
                .is_some_and(|at| now.duration_since(at) <= self.config.disconnect_timeout);
            if entry.open == 0 {
                entry.connected_at = now;
            }
            entry.open += 1;
            entry.last_seen = now;
            entry.disconnected_at = None;
            reconnect
        };
        self.metrics.adjust_gauge(metrics::ACTIVE_CONNECTIONS, 1);

        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))?;
        if session.is_completed() {
            return Ok(reconnect);
        }
        let player = session
            .player_mut(player_id)
            .ok_or_else(|| GameError::PlayerNotInSession(player_id.to_string()))?;

        let was_inactive = !player.is_active;
        player.is_active = true;
        if reconnect {
            self.publish(
                session_id,
                ServerEvent::PlayerReconnected {
                    player_id: player_id.to_string(),
                },
            );
        }
        if was_inactive {
            self.publish_snapshot(session);
        }

        tracing::info!(
            "Player {} connected to session {}{}",
            player_id,
            session_id,
            if reconnect { " (reconnect)" } else { "" }
        );
        Ok(reconnect)
    }

    /// Drop one realtime connection; the player goes inactive when none remain
    pub async fn disconnect_player(&self, session_id: &str, player_id: &str) {
        let now = Instant::now();
        let still_connected = {
            let mut connections = self.connections.write().await;
            match connections.get_mut(&(session_id.to_string(), player_id.to_string())) {
                Some(entry) => {
                    if entry.open > 0 {
                        entry.open -= 1;
                        self.metrics.adjust_gauge(metrics::ACTIVE_CONNECTIONS, -1);
                    }
                    entry.last_seen = now;
                    if entry.open == 0 {
                        entry.disconnected_at = Some(now);
                    }
                    entry.is_connected()
                }
                None => false,
            }
        };
        if still_connected {
            return;
        }

        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(session_id) else {
            return;
        };
        if session.is_completed() {
            return;
        }
        let Some(player) = session.player_mut(player_id) else {
            return;
        };
        if !player.is_active {
            return;
        }

        player.is_active = false;
        self.publish(
            session_id,
            ServerEvent::PlayerLeft {
                player_id: player_id.to_string(),
            },
        );
        self.publish_snapshot(session);
        tracing::info!("Player {} left session {}", player_id, session_id);
    }

    /// Refresh the idle timer of a live connection
    pub async fn touch_connection(&self, session_id: &str, player_id: &str) {
        let mut connections = self.connections.write().await;
        if let Some(entry) = connections.get_mut(&(session_id.to_string(), player_id.to_string())) {
            entry.last_seen = Instant::now();
        }
    }

    /// Forget players who have been disconnected longer than the timeout
    pub async fn cleanup_inactive_connections(&self) -> usize {
        let timeout = self.config.disconnect_timeout;
        let mut connections = self.connections.write().await;
        let before = connections.len();
        connections.retain(|_, info| {
            info.is_connected()
                || info
                    .disconnected_at
                    .map_or(true, |at| at.elapsed() <= timeout)
        });
        before - connections.len()
    }

    /// Players with at least one open connection to the session
    pub async fn active_players(&self, session_id: &str) -> Vec<PlayerId> {
        let mut players: Vec<PlayerId> = self
            .connections
            .read()
            .await
            .iter()
            .filter(|((sid, _), info)| sid == session_id && info.is_connected())
            .map(|((_, pid), _)| pid.clone())
            .collect();
        players.sort();
        players
    }
}
