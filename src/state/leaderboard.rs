use super::AppState;
use crate::types::*;
use chrono::Utc;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankCategory {
    Fastest,
    HighestAvg,
    MostCompleted,
}

fn fastest(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    a.completion_time_ms.cmp(&b.completion_time_ms)
}

fn highest_avg(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.average_score
        .partial_cmp(&a.average_score)
        .unwrap_or(Ordering::Equal)
}

fn most_completed(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.doors_completed.cmp(&a.doors_completed)
}

fn most_recent(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    b.completed_at.cmp(&a.completed_at)
}

fn top<F>(entries: &[&LeaderboardEntry], limit: usize, order: F) -> Vec<LeaderboardEntry>
where
    F: Fn(&LeaderboardEntry, &LeaderboardEntry) -> Ordering,
{
    let mut sorted: Vec<&LeaderboardEntry> = entries.to_vec();
    sorted.sort_by(|a, b| order(a, b));
    sorted.into_iter().take(limit).cloned().collect()
}

impl LeaderboardFilter {
    fn matches(&self, entry: &LeaderboardEntry) -> bool {
        self.mode.map_or(true, |m| entry.game_mode == m)
            && self
                .theme
                .as_deref()
                .map_or(true, |t| entry.theme.as_deref() == Some(t))
    }

    fn effective_limit(&self) -> usize {
        match self.limit {
            None | Some(0) => DEFAULT_LIMIT,
            Some(n) => n.min(MAX_LIMIT),
        }
    }
}

impl AppState {
    pub async fn global_leaderboard(&self, filter: &LeaderboardFilter) -> GlobalLeaderboard {
        let board = self.leaderboard.read().await;
        let entries: Vec<&LeaderboardEntry> = board.iter().filter(|e| filter.matches(e)).collect();
        let winners: Vec<&LeaderboardEntry> =
            entries.iter().copied().filter(|e| e.is_winner).collect();
        let limit = filter.effective_limit();

        GlobalLeaderboard {
            fastest_completions: top(&winners, limit, fastest),
            highest_averages: top(&entries, limit, highest_avg),
            most_completed: top(&entries, limit, most_completed),
            recent_winners: top(&winners, limit, most_recent),
        }
    }

    pub async fn leaderboard_stats(&self) -> LeaderboardStats {
        let board = self.leaderboard.read().await;
        if board.is_empty() {
            return LeaderboardStats {
                last_updated: Utc::now(),
                ..Default::default()
            };
        }

        let games: HashSet<&str> = board.iter().map(|e| e.session_id.as_str()).collect();
        let total_time: i64 = board.iter().map(|e| e.completion_time_ms).sum();

        let mut per_player: HashMap<&str, usize> = HashMap::new();
        for entry in board.iter() {
            *per_player.entry(entry.username.as_str()).or_insert(0) += 1;
        }
        let most_active_player = per_player
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(name, _)| name.to_string());

        LeaderboardStats {
            total_games_completed: games.len() as u32,
            average_completion_time_ms: total_time / board.len() as i64,
            fastest_ever_time_ms: board
                .iter()
                .filter(|e| e.is_winner)
                .map(|e| e.completion_time_ms)
                .min()
                .unwrap_or(0),
            highest_ever_average: board
                .iter()
                .map(|e| e.average_score)
                .fold(0.0, f64::max),
            most_active_player,
            last_updated: board
                .iter()
                .map(|e| e.completed_at)
                .max()
                .unwrap_or_else(Utc::now),
        }
    }

    /// 1-based position of a player's best entry in a category
    pub async fn player_rank(&self, player_id: &str, category: RankCategory) -> Option<usize> {
        let board = self.leaderboard.read().await;
        let mut entries: Vec<&LeaderboardEntry> = match category {
            RankCategory::Fastest => board.iter().filter(|e| e.is_winner).collect(),
            _ => board.iter().collect(),
        };
        let order = match category {
            RankCategory::Fastest => fastest,
            RankCategory::HighestAvg => highest_avg,
            RankCategory::MostCompleted => most_completed,
        };
        entries.sort_by(|a, b| order(a, b));
        entries
            .iter()
            .position(|e| e.player_id == player_id)
            .map(|i| i + 1)
    }
}
