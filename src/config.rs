//! Server configuration loaded from environment variables.

use std::time::Duration;

/// Runtime settings for the game server
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Base URL of the AI scoring service; the local heuristic is used when unset
    pub ai_service_url: Option<String>,
    pub ai_timeout: Duration,
    /// How long players have to answer a door
    pub door_time_limit: Duration,
    /// Pause between a finished round and the next door
    pub next_door_delay: Duration,
    /// Idle time after which a disconnected player's registry entry is dropped
    pub disconnect_timeout: Duration,
    pub door_cache_ttl: Duration,
    pub max_players: usize,
    /// How long a completed session stays queryable before it is evicted
    pub completed_session_retention: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            ai_service_url: None,
            ai_timeout: Duration::from_secs(30),
            door_time_limit: Duration::from_secs(60),
            next_door_delay: Duration::from_millis(3000),
            disconnect_timeout: Duration::from_secs(300),
            door_cache_ttl: Duration::from_secs(86_400),
            max_players: 8,
            completed_session_retention: Duration::from_secs(3600),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let ai_service_url = std::env::var("AI_SERVICE_URL").ok().and_then(|url| {
            let trimmed = url.trim().trim_end_matches('/');
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });

        Self {
            port: env_parse("PORT").unwrap_or(defaults.port),
            ai_service_url,
            ai_timeout: env_parse("AI_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.ai_timeout),
            door_time_limit: env_parse("DOOR_TIME_LIMIT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.door_time_limit),
            next_door_delay: env_parse("NEXT_DOOR_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.next_door_delay),
            disconnect_timeout: env_parse("DISCONNECT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.disconnect_timeout),
            door_cache_ttl: env_parse("DOOR_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.door_cache_ttl),
            max_players: env_parse::<usize>("MAX_PLAYERS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_players),
            completed_session_retention: env_parse("COMPLETED_SESSION_RETENTION_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.completed_session_retention),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
