use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Messages a client sends over the realtime connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Heartbeat; `sent_at` is echoed back in the pong (unix millis)
    Ping { sent_at: i64 },
    SubmitResponse { response: String },
    /// Ask for a fresh snapshot
    RequestSync,
}

/// Every server push is wrapped in an envelope carrying the session sequence number.
///
/// `seq` increases strictly per session and is assigned under the same lock that
/// performed the mutation, so clients can discard anything older than what they
/// already applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub session_id: SessionId,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ServerEvent,
}

impl Envelope {
    pub fn new(session_id: impl Into<SessionId>, seq: u64, event: ServerEvent) -> Self {
        Self {
            session_id: session_id.into(),
            seq,
            timestamp: Utc::now(),
            event,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Welcome snapshot, sent on every (re)connect and on request-sync
    ConnectionEstablished {
        player_id: PlayerId,
        session: GameSession,
    },
    SessionUpdate {
        session: GameSession,
    },
    PlayerJoined {
        player: PlayerInfo,
    },
    PlayerLeft {
        player_id: PlayerId,
    },
    PlayerReconnected {
        player_id: PlayerId,
    },
    DoorPresented {
        door: Door,
        time_limit_secs: u64,
    },
    ResponseSubmitted {
        player_id: PlayerId,
        response: PlayerResponse,
        total_score: u32,
    },
    ScoresUpdated {
        door_id: DoorId,
        scores: Vec<PlayerScore>,
    },
    ProgressUpdate {
        progress: SessionProgress,
    },
    PlayerPositionUpdate {
        player_id: PlayerId,
        position: u32,
        total_doors: u32,
    },
    LeaderboardUpdate {
        leaderboard: Vec<PlayerProgress>,
    },
    ResponseTimeout {
        door_id: DoorId,
    },
    GameCompleted {
        winner_id: Option<PlayerId>,
        winner_username: Option<String>,
        rankings: Vec<PlayerRanking>,
        #[serde(default)]
        performance_stats: Vec<PlayerPerformanceStats>,
        duration_ms: i64,
    },
    Pong {
        sent_at: i64,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerEvent {
    /// Stateful events mutate the client snapshot and are subject to the sequence check
    pub fn is_stateful(&self) -> bool {
        matches!(
            self,
            ServerEvent::ConnectionEstablished { .. }
                | ServerEvent::SessionUpdate { .. }
                | ServerEvent::PlayerJoined { .. }
                | ServerEvent::PlayerLeft { .. }
                | ServerEvent::PlayerReconnected { .. }
                | ServerEvent::DoorPresented { .. }
                | ServerEvent::ResponseSubmitted { .. }
                | ServerEvent::ScoresUpdated { .. }
                | ServerEvent::PlayerPositionUpdate { .. }
        )
    }

    /// The wire tag, handy for logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::ConnectionEstablished { .. } => "connection-established",
            ServerEvent::SessionUpdate { .. } => "session-update",
            ServerEvent::PlayerJoined { .. } => "player-joined",
            ServerEvent::PlayerLeft { .. } => "player-left",
            ServerEvent::PlayerReconnected { .. } => "player-reconnected",
            ServerEvent::DoorPresented { .. } => "door-presented",
            ServerEvent::ResponseSubmitted { .. } => "response-submitted",
            ServerEvent::ScoresUpdated { .. } => "scores-updated",
            ServerEvent::ProgressUpdate { .. } => "progress-update",
            ServerEvent::PlayerPositionUpdate { .. } => "player-position-update",
            ServerEvent::LeaderboardUpdate { .. } => "leaderboard-update",
            ServerEvent::ResponseTimeout { .. } => "response-timeout",
            ServerEvent::GameCompleted { .. } => "game-completed",
            ServerEvent::Pong { .. } => "pong",
            ServerEvent::Error { .. } => "error",
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// One player's result for a finished door
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerScore {
    pub player_id: PlayerId,
    pub username: String,
    /// None when the player did not answer before the round closed
    pub score: Option<u32>,
    pub total_score: u32,
    pub position: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_flattens_event_tag() {
        let env = Envelope::new(
            "s1",
            7,
            ServerEvent::PlayerPositionUpdate {
                player_id: "p1".to_string(),
                position: 3,
                total_doors: 10,
            },
        );
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["type"], "player-position-update");
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["seq"], 7);
        assert_eq!(json["playerId"], "p1");
        assert_eq!(json["totalDoors"], 10);

        let back: Envelope = serde_json::from_value(json).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn test_client_message_tags() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"ping","sentAt":1234}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping { sent_at: 1234 });

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"request-sync"}"#).unwrap();
        assert_eq!(msg, ClientMessage::RequestSync);

        let json = serde_json::to_string(&ClientMessage::SubmitResponse {
            response: "hello there".to_string(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"submit-response""#));
    }

    #[test]
    fn test_kind_matches_wire_tag() {
        let event = ServerEvent::ResponseTimeout {
            door_id: "d1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.kind());
        assert!(!event.is_stateful());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = serde_json::from_str::<ServerEvent>(r#"{"type":"door-slammed"}"#);
        assert!(result.is_err());
    }
}
