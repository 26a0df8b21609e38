//! Client-side session reconciliation.
//!
//! Every pushed envelope goes through [`SessionStore::apply`]. Snapshots
//! replace the local copy wholesale, deltas patch only the fields they name,
//! and anything carrying a sequence number at or below the last applied one is
//! dropped.

use crate::protocol::{Envelope, ServerEvent};
use crate::state::leaderboard_of;
use crate::types::*;

/// What `apply` did with an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The snapshot was replaced
    Snapshot,
    /// Named fields were patched
    Delta,
    /// Sequence number at or below the last applied one
    Stale,
    /// No snapshot to patch yet, or the game is already over
    Ignored,
    /// Not subject to ordering; carried through untouched
    Passthrough,
}

impl Applied {
    pub fn changed(&self) -> bool {
        matches!(self, Applied::Snapshot | Applied::Delta)
    }
}

#[derive(Debug, Default, Clone)]
pub struct SessionStore {
    session: Option<GameSession>,
    last_seq: u64,
    /// Standings derived from the local snapshot, or the latest server push
    leaderboard: Vec<PlayerProgress>,
    progress: Option<SessionProgress>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<&GameSession> {
        self.session.as_ref()
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn leaderboard(&self) -> &[PlayerProgress] {
        &self.leaderboard
    }

    pub fn progress(&self) -> Option<&SessionProgress> {
        self.progress.as_ref()
    }

    pub fn position_of(&self, player_id: &str) -> Option<u32> {
        self.session
            .as_ref()
            .and_then(|s| s.player(player_id))
            .map(|p| p.current_position)
    }

    pub fn is_completed(&self) -> bool {
        self.session.as_ref().is_some_and(GameSession::is_completed)
    }

    pub fn apply(&mut self, envelope: &Envelope) -> Applied {
        let event = &envelope.event;

        if !event.is_stateful() {
            match event {
                ServerEvent::LeaderboardUpdate { leaderboard } => {
                    self.leaderboard = leaderboard.clone();
                }
                ServerEvent::ProgressUpdate { progress } => {
                    self.progress = Some(progress.clone());
                }
                _ => {}
            }
            return Applied::Passthrough;
        }

        // A welcome always wins and resets the floor, even below it
        if let ServerEvent::ConnectionEstablished { session, .. } = event {
            self.replace(session.clone());
            self.last_seq = envelope.seq;
            return Applied::Snapshot;
        }

        if self.is_completed() {
            return Applied::Ignored;
        }
        if envelope.seq <= self.last_seq {
            tracing::debug!(
                "Dropping stale {} #{} (last applied #{})",
                event.kind(),
                envelope.seq,
                self.last_seq
            );
            return Applied::Stale;
        }

        let applied = match event {
            ServerEvent::SessionUpdate { session } => {
                self.replace(session.clone());
                Applied::Snapshot
            }
            _ => match self.session.as_mut() {
                Some(session) => {
                    patch(session, event);
                    self.leaderboard = leaderboard_of(session);
                    Applied::Delta
                }
                None => return Applied::Ignored,
            },
        };
        self.last_seq = envelope.seq;
        applied
    }

    fn replace(&mut self, session: GameSession) {
        self.leaderboard = leaderboard_of(&session);
        self.session = Some(session);
    }
}

/// Apply a delta event to the fields it names. Positions and totals only grow.
fn patch(session: &mut GameSession, event: &ServerEvent) {
    match event {
        ServerEvent::PlayerJoined { player } => {
            if session.player(&player.player_id).is_none() {
                session.players.push(player.clone());
            }
        }
        ServerEvent::PlayerLeft { player_id } => {
            if let Some(p) = session.player_mut(player_id) {
                p.is_active = false;
            }
        }
        ServerEvent::PlayerReconnected { player_id } => {
            if let Some(p) = session.player_mut(player_id) {
                p.is_active = true;
            }
        }
        ServerEvent::DoorPresented { door, .. } => {
            session.current_door = Some(door.clone());
        }
        ServerEvent::ResponseSubmitted {
            player_id,
            response,
            total_score,
        } => {
            if let Some(p) = session.player_mut(player_id) {
                if !p.has_responded_to(&response.door_id) {
                    p.responses.push(response.clone());
                }
                p.total_score = p.total_score.max(*total_score);
            }
        }
        ServerEvent::ScoresUpdated { scores, .. } => {
            for score in scores {
                if let Some(p) = session.player_mut(&score.player_id) {
                    p.total_score = p.total_score.max(score.total_score);
                    p.current_position = p.current_position.max(score.position);
                }
            }
        }
        ServerEvent::PlayerPositionUpdate {
            player_id,
            position,
            total_doors,
        } => {
            if let Some(p) = session.player_mut(player_id) {
                p.current_position = p.current_position.max(*position);
                p.path.total_doors = *total_doors;
            }
        }
        _ => {}
    }
}
