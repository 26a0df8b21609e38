use super::AppState;
use crate::error::{GameError, GameResult};
use crate::types::*;
use chrono::Utc;
use std::cmp::Ordering;

/// Furthest along first, then highest score
fn by_standing(a: &PlayerInfo, b: &PlayerInfo) -> Ordering {
    b.current_position
        .cmp(&a.current_position)
        .then_with(|| b.total_score.cmp(&a.total_score))
}

pub fn progress_of(session: &GameSession) -> SessionProgress {
    let leader = session.players.iter().min_by(|a, b| by_standing(a, b));
    SessionProgress {
        session_id: session.session_id.clone(),
        players: session.players.iter().map(PlayerProgress::from).collect(),
        current_door_id: session.current_door.as_ref().map(|d| d.door_id.clone()),
        game_status: session.status,
        leader_player_id: leader
            .filter(|p| p.current_position > 0 || p.total_score > 0)
            .map(|p| p.player_id.clone()),
        updated_at: Utc::now(),
    }
}

pub fn leaderboard_of(session: &GameSession) -> Vec<PlayerProgress> {
    let mut players: Vec<&PlayerInfo> = session.players.iter().collect();
    players.sort_by(|a, b| by_standing(a, b));
    players.into_iter().map(PlayerProgress::from).collect()
}

/// Paths this long or longer count as zero efficiency
const PATH_EFFICIENCY_CEILING: u32 = 15;

/// Game start to the response that finished the path; only winners have one
fn completion_time_ms(session: &GameSession, p: &PlayerInfo) -> Option<i64> {
    if !p.has_won() {
        return None;
    }
    let started_at = session.started_at?;
    let last = p.responses.last()?;
    Some((last.submitted_at - started_at).num_milliseconds().max(0))
}

/// Winners first, fastest winner ahead; everyone else by how much of their path they covered
fn by_placement(a: &PlayerRanking, b: &PlayerRanking) -> Ordering {
    b.is_winner.cmp(&a.is_winner).then_with(|| {
        if a.is_winner {
            match (a.completion_time_ms, b.completion_time_ms) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => b.total_score.cmp(&a.total_score),
            }
        } else {
            b.completion_rate
                .total_cmp(&a.completion_rate)
                .then_with(|| b.average_score.total_cmp(&a.average_score))
        }
    })
}

pub fn rankings_of(session: &GameSession) -> Vec<PlayerRanking> {
    let mut rankings: Vec<PlayerRanking> = session
        .players
        .iter()
        .map(|p| {
            let progress = PlayerProgress::from(p);
            PlayerRanking {
                rank: 0,
                player_id: p.player_id.clone(),
                username: p.username.clone(),
                total_score: p.total_score,
                average_score: progress.average_score,
                doors_completed: progress.doors_completed,
                completion_rate: progress.progress_percent,
                is_winner: p.has_won(),
                completion_time_ms: completion_time_ms(session, p),
            }
        })
        .collect();
    rankings.sort_by(by_placement);
    for (i, ranking) in rankings.iter_mut().enumerate() {
        ranking.rank = i as u32 + 1;
    }
    rankings
}

fn path_efficiency(total_doors: u32) -> f64 {
    let span = (PATH_EFFICIENCY_CEILING - MIN_PATH_LENGTH) as f64;
    ((PATH_EFFICIENCY_CEILING as f64 - total_doors as f64) / span * 100.0).clamp(0.0, 100.0)
}

pub fn performance_of(session: &GameSession) -> Vec<PlayerPerformanceStats> {
    session
        .players
        .iter()
        .map(|p| {
            let progress = PlayerProgress::from(p);
            let count = p.responses.len();
            let mean = |metric: fn(&ScoringMetrics) -> u32| {
                if count == 0 {
                    0.0
                } else {
                    p.responses
                        .iter()
                        .map(|r| metric(&r.scoring_metrics) as f64)
                        .sum::<f64>()
                        / count as f64
                }
            };

            // Each response is timed from the one before it, the first from game start
            let mut previous = session.started_at;
            let gaps: Vec<i64> = p
                .responses
                .iter()
                .filter_map(|r| {
                    let gap = previous.map(|prev| (r.submitted_at - prev).num_milliseconds().max(0));
                    previous = Some(r.submitted_at);
                    gap
                })
                .collect();
            let average_response_time_ms = if gaps.is_empty() {
                0
            } else {
                gaps.iter().sum::<i64>() / gaps.len() as i64
            };

            PlayerPerformanceStats {
                player_id: p.player_id.clone(),
                username: p.username.clone(),
                total_score: p.total_score,
                doors_completed: progress.doors_completed,
                total_doors: p.path.total_doors,
                completion_rate: progress.progress_percent,
                completion_time_ms: completion_time_ms(session, p),
                path_efficiency: path_efficiency(p.path.total_doors),
                average_score: progress.average_score,
                highest_score: p.responses.iter().map(|r| r.ai_score).max().unwrap_or(0),
                lowest_score: p.responses.iter().map(|r| r.ai_score).min().unwrap_or(0),
                average_response_time_ms,
                average_creativity: mean(|m| m.creativity),
                average_feasibility: mean(|m| m.feasibility),
                average_humor: mean(|m| m.humor),
                average_originality: mean(|m| m.originality),
            }
        })
        .collect()
}

impl AppState {
    pub async fn session_progress(&self, session_id: &str) -> GameResult<SessionProgress> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))?;
        Ok(progress_of(session))
    }

    pub async fn session_leaderboard(&self, session_id: &str) -> GameResult<Vec<PlayerProgress>> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))?;
        Ok(leaderboard_of(session))
    }

    pub async fn final_rankings(&self, session_id: &str) -> GameResult<Vec<PlayerRanking>> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| GameError::SessionNotFound(session_id.to_string()))?;
        Ok(rankings_of(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: &str, position: u32, score: u32) -> PlayerInfo {
        let mut p = PlayerInfo::new(id.to_string(), id.to_uppercase());
        p.current_position = position;
        p.total_score = score;
        p
    }

    fn answer(id: &str, score: u32, metrics: ScoringMetrics, at_ms: i64) -> PlayerResponse {
        PlayerResponse {
            response_id: format!("r_{}_{}", id, at_ms),
            door_id: "door".to_string(),
            player_id: id.to_string(),
            content: "climb out through the window".to_string(),
            ai_score: score,
            submitted_at: start() + chrono::Duration::milliseconds(at_ms),
            scoring_metrics: metrics,
        }
    }

    fn start() -> chrono::DateTime<Utc> {
        chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn session(players: Vec<PlayerInfo>) -> GameSession {
        GameSession {
            session_id: "s".to_string(),
            mode: GameMode::Multiplayer,
            theme: None,
            players,
            status: GameStatus::Active,
            current_door: None,
            version: 1,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_progress_percent_and_leader() {
        let s = session(vec![player("a", 2, 100), player("b", 5, 80)]);
        let progress = progress_of(&s);
        assert_eq!(progress.leader_player_id.as_deref(), Some("b"));
        assert_eq!(progress.players[0].progress_percent, 20.0);
        assert_eq!(progress.players[1].progress_percent, 50.0);
    }

    #[test]
    fn test_no_leader_before_anyone_moves() {
        let s = session(vec![player("a", 0, 0), player("b", 0, 0)]);
        assert!(progress_of(&s).leader_player_id.is_none());
    }

    #[test]
    fn test_leaderboard_ties_break_on_score() {
        let s = session(vec![player("a", 3, 120), player("b", 3, 150), player("c", 1, 300)]);
        let ids: Vec<String> = leaderboard_of(&s).into_iter().map(|p| p.player_id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_rankings_put_winner_first() {
        let mut winner = player("a", 6, 200);
        winner.path.total_doors = 6;
        let s = session(vec![player("b", 8, 500), winner]);

        let rankings = rankings_of(&s);
        assert_eq!(rankings[0].player_id, "a");
        assert!(rankings[0].is_winner);
        assert_eq!(rankings[0].completion_rate, 100.0);
        assert_eq!(rankings[1].rank, 2);
        assert!(!rankings[1].is_winner);
    }

    #[test]
    fn test_rankings_favor_completion_rate_over_position() {
        let mut a = player("a", 5, 250);
        a.path.total_doors = 12;
        let mut b = player("b", 4, 200);
        b.path.total_doors = 5;
        let s = session(vec![a, b]);

        let rankings = rankings_of(&s);
        assert_eq!(rankings[0].player_id, "b");
        assert_eq!(rankings[0].completion_rate, 80.0);
        assert_eq!(rankings[1].player_id, "a");
        assert!(rankings[1].completion_rate < 42.0);
        assert!(rankings.iter().all(|r| r.completion_time_ms.is_none()));
    }

    #[test]
    fn test_rankings_order_winners_by_completion_time() {
        let metrics = ScoringMetrics::FALLBACK;
        let mut slow = player("slow", 5, 400);
        slow.path.total_doors = 5;
        slow.responses.push(answer("slow", 80, metrics, 90_000));
        let mut fast = player("fast", 5, 300);
        fast.path.total_doors = 5;
        fast.responses.push(answer("fast", 60, metrics, 30_000));

        let mut s = session(vec![slow, fast, player("c", 9, 900)]);
        s.started_at = Some(start());

        let rankings = rankings_of(&s);
        let ids: Vec<&str> = rankings.iter().map(|r| r.player_id.as_str()).collect();
        assert_eq!(ids, vec!["fast", "slow", "c"]);
        assert_eq!(rankings[0].completion_time_ms, Some(30_000));
        assert_eq!(rankings[1].completion_time_ms, Some(90_000));
        assert_eq!(rankings[2].rank, 3);
    }

    #[test]
    fn test_performance_stats() {
        let mut a = player("a", 2, 120);
        a.responses.push(answer(
            "a",
            80,
            ScoringMetrics {
                creativity: 90,
                feasibility: 70,
                humor: 80,
                originality: 80,
            },
            10_000,
        ));
        a.responses.push(answer(
            "a",
            40,
            ScoringMetrics {
                creativity: 30,
                feasibility: 50,
                humor: 40,
                originality: 40,
            },
            40_000,
        ));
        let mut idle = player("idle", 0, 0);
        idle.path.total_doors = 16;
        let mut s = session(vec![a, idle]);
        s.started_at = Some(start());

        let stats = performance_of(&s);
        let a = &stats[0];
        assert_eq!(a.doors_completed, 2);
        assert_eq!(a.highest_score, 80);
        assert_eq!(a.lowest_score, 40);
        assert_eq!(a.average_creativity, 60.0);
        assert_eq!(a.average_feasibility, 60.0);
        assert_eq!(a.average_response_time_ms, 20_000);
        assert_eq!(a.path_efficiency, 50.0);
        assert_eq!(a.completion_rate, 20.0);
        assert!(a.completion_time_ms.is_none());

        let idle = &stats[1];
        assert_eq!(idle.highest_score, 0);
        assert_eq!(idle.average_response_time_ms, 0);
        assert_eq!(idle.path_efficiency, 0.0);
    }
}
