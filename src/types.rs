use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Opaque ID types for type safety
pub type SessionId = String;
pub type PlayerId = String;
pub type DoorId = String;
pub type ResponseId = String;

/// Doors on a fresh path
pub const DEFAULT_PATH_LENGTH: u32 = 10;
/// A good run can never shorten a path below this
pub const MIN_PATH_LENGTH: u32 = 5;
pub const MIN_DIFFICULTY: u8 = 1;
pub const MAX_DIFFICULTY: u8 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GameMode {
    Multiplayer,
    SinglePlayer,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Waiting,
    Active,
    Completed,
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GameStatus::Waiting => "waiting",
            GameStatus::Active => "active",
            GameStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// One game instance with one or more players.
///
/// Mutated only by the server; clients treat it as a read-mostly projection.
/// `version` is bumped on every mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameSession {
    pub session_id: SessionId,
    pub mode: GameMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    pub players: Vec<PlayerInfo>,
    pub status: GameStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_door: Option<Door>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl GameSession {
    pub fn player(&self, player_id: &str) -> Option<&PlayerInfo> {
        self.players.iter().find(|p| p.player_id == player_id)
    }

    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut PlayerInfo> {
        self.players.iter_mut().find(|p| p.player_id == player_id)
    }

    pub fn is_completed(&self) -> bool {
        self.status == GameStatus::Completed
    }

    /// Theme used for door selection
    pub fn theme_or_default(&self) -> &str {
        self.theme.as_deref().unwrap_or("general")
    }

    /// Doors this session has presented or players have answered
    pub fn seen_door_ids(&self) -> HashSet<DoorId> {
        self.players
            .iter()
            .flat_map(|p| p.responses.iter().map(|r| r.door_id.clone()))
            .chain(self.current_door.iter().map(|d| d.door_id.clone()))
            .collect()
    }

    /// True when every active player has answered the given door
    pub fn all_active_responded(&self, door_id: &str) -> bool {
        self.players
            .iter()
            .filter(|p| p.is_active)
            .all(|p| p.has_responded_to(door_id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub player_id: PlayerId,
    pub username: String,
    pub joined_at: DateTime<Utc>,
    /// Number of doors completed, i.e. the index of the next door
    pub current_position: u32,
    pub total_score: u32,
    pub responses: Vec<PlayerResponse>,
    pub is_active: bool,
    #[serde(default)]
    pub path: PlayerPath,
}

impl PlayerInfo {
    pub fn new(player_id: PlayerId, username: String) -> Self {
        Self {
            player_id,
            username,
            joined_at: Utc::now(),
            current_position: 0,
            total_score: 0,
            responses: Vec::new(),
            is_active: true,
            path: PlayerPath::default(),
        }
    }

    pub fn has_responded_to(&self, door_id: &str) -> bool {
        self.responses.iter().any(|r| r.door_id == door_id)
    }

    pub fn last_score(&self) -> Option<u32> {
        self.responses.last().map(|r| r.ai_score)
    }

    pub fn average_score(&self) -> f64 {
        if self.responses.is_empty() {
            return 0.0;
        }
        let sum: u32 = self.responses.iter().map(|r| r.ai_score).sum();
        sum as f64 / self.responses.len() as f64
    }

    pub fn has_won(&self) -> bool {
        self.current_position >= self.path.total_doors
    }
}

/// How long a player's path is and how hard its next door should be
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPath {
    pub total_doors: u32,
    pub current_difficulty: u8,
}

impl Default for PlayerPath {
    fn default() -> Self {
        Self {
            total_doors: DEFAULT_PATH_LENGTH,
            current_difficulty: MIN_DIFFICULTY,
        }
    }
}

impl PlayerPath {
    /// Good answers shorten the path and ease the next door, bad ones do the opposite
    pub fn adjust_for_score(&mut self, score: u32) {
        if score > 70 {
            if self.total_doors > MIN_PATH_LENGTH {
                self.total_doors -= 1;
            }
            self.current_difficulty = self.current_difficulty.saturating_sub(1).max(MIN_DIFFICULTY);
        } else if score < 30 {
            self.total_doors += 1;
            self.current_difficulty = (self.current_difficulty + 1).min(MAX_DIFFICULTY);
        }
    }
}

/// A single scenario presented to players
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Door {
    pub door_id: DoorId,
    pub content: String,
    pub theme: String,
    pub difficulty: u8,
    #[serde(default)]
    pub expected_solution_types: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerResponse {
    pub response_id: ResponseId,
    pub door_id: DoorId,
    pub player_id: PlayerId,
    pub content: String,
    pub ai_score: u32,
    pub submitted_at: DateTime<Utc>,
    pub scoring_metrics: ScoringMetrics,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScoringMetrics {
    pub creativity: u32,
    pub feasibility: u32,
    pub humor: u32,
    pub originality: u32,
}

impl ScoringMetrics {
    /// Used whenever the scorer cannot produce a result
    pub const FALLBACK: ScoringMetrics = ScoringMetrics {
        creativity: 50,
        feasibility: 50,
        humor: 50,
        originality: 50,
    };

    /// Overall score: the integer average of the four metrics
    pub fn total(&self) -> u32 {
        (self.creativity + self.feasibility + self.humor + self.originality) / 4
    }
}

/// A player's standing within a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProgress {
    pub player_id: PlayerId,
    pub username: String,
    pub current_position: u32,
    pub total_doors: u32,
    pub total_score: u32,
    pub average_score: f64,
    pub doors_completed: u32,
    pub progress_percent: f64,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_response_at: Option<DateTime<Utc>>,
}

impl From<&PlayerInfo> for PlayerProgress {
    fn from(p: &PlayerInfo) -> Self {
        let total_doors = p.path.total_doors;
        let progress_percent = if total_doors > 0 {
            (p.current_position as f64 * 100.0 / total_doors as f64).min(100.0)
        } else {
            0.0
        };
        Self {
            player_id: p.player_id.clone(),
            username: p.username.clone(),
            current_position: p.current_position,
            total_doors,
            total_score: p.total_score,
            average_score: p.average_score(),
            doors_completed: p.responses.len() as u32,
            progress_percent,
            is_active: p.is_active,
            last_response_at: p.responses.last().map(|r| r.submitted_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionProgress {
    pub session_id: SessionId,
    pub players: Vec<PlayerProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_door_id: Option<DoorId>,
    pub game_status: GameStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader_player_id: Option<PlayerId>,
    pub updated_at: DateTime<Utc>,
}

/// Final placement of a player when a session completes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRanking {
    pub rank: u32,
    pub player_id: PlayerId,
    pub username: String,
    pub total_score: u32,
    pub average_score: f64,
    pub doors_completed: u32,
    pub completion_rate: f64,
    pub is_winner: bool,
    /// Time from game start to the winning response, only set for winners
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time_ms: Option<i64>,
}

/// Per-player breakdown published alongside the final rankings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPerformanceStats {
    pub player_id: PlayerId,
    pub username: String,
    pub total_score: u32,
    pub doors_completed: u32,
    pub total_doors: u32,
    pub completion_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time_ms: Option<i64>,
    /// 100 for the shortest possible path, 0 at or beyond the efficiency ceiling
    pub path_efficiency: f64,
    pub average_score: f64,
    pub highest_score: u32,
    pub lowest_score: u32,
    pub average_response_time_ms: i64,
    pub average_creativity: f64,
    pub average_feasibility: f64,
    pub average_humor: f64,
    pub average_originality: f64,
}

/// One completed game in the global leaderboard
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub username: String,
    pub completion_time_ms: i64,
    pub total_score: u32,
    pub average_score: f64,
    pub doors_completed: u32,
    pub is_winner: bool,
    pub game_mode: GameMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    pub session_id: SessionId,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalLeaderboard {
    pub fastest_completions: Vec<LeaderboardEntry>,
    pub highest_averages: Vec<LeaderboardEntry>,
    pub most_completed: Vec<LeaderboardEntry>,
    pub recent_winners: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardStats {
    pub total_games_completed: u32,
    pub average_completion_time_ms: i64,
    pub fastest_ever_time_ms: i64,
    pub highest_ever_average: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_active_player: Option<String>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardFilter {
    pub mode: Option<GameMode>,
    pub theme: Option<String>,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_adjusts_for_good_score() {
        let mut path = PlayerPath {
            total_doors: 10,
            current_difficulty: 2,
        };
        path.adjust_for_score(85);
        assert_eq!(path.total_doors, 9);
        assert_eq!(path.current_difficulty, 1);
    }

    #[test]
    fn test_path_never_shorter_than_minimum() {
        let mut path = PlayerPath {
            total_doors: MIN_PATH_LENGTH,
            current_difficulty: 1,
        };
        path.adjust_for_score(99);
        assert_eq!(path.total_doors, MIN_PATH_LENGTH);
        assert_eq!(path.current_difficulty, 1);
    }

    #[test]
    fn test_path_grows_for_bad_score() {
        let mut path = PlayerPath::default();
        path.adjust_for_score(10);
        path.adjust_for_score(10);
        path.adjust_for_score(10);
        assert_eq!(path.total_doors, 13);
        assert_eq!(path.current_difficulty, MAX_DIFFICULTY);
    }

    #[test]
    fn test_middling_score_keeps_path() {
        let mut path = PlayerPath::default();
        path.adjust_for_score(50);
        assert_eq!(path, PlayerPath::default());
    }

    #[test]
    fn test_metrics_total_is_integer_average() {
        let metrics = ScoringMetrics {
            creativity: 80,
            feasibility: 61,
            humor: 70,
            originality: 90,
        };
        assert_eq!(metrics.total(), 75);
        assert_eq!(ScoringMetrics::FALLBACK.total(), 50);
    }

    #[test]
    fn test_session_serializes_camel_case() {
        let session = GameSession {
            session_id: "s1".to_string(),
            mode: GameMode::SinglePlayer,
            theme: None,
            players: vec![PlayerInfo::new("p1".to_string(), "alice".to_string())],
            status: GameStatus::Waiting,
            current_door: None,
            version: 1,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["mode"], "single-player");
        assert_eq!(json["status"], "waiting");
        assert_eq!(json["players"][0]["currentPosition"], 0);
        assert_eq!(json["players"][0]["isActive"], true);
    }
}
