use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::types::{Door, MAX_DIFFICULTY, MIN_DIFFICULTY};

pub type GenerationResult<T> = Result<T, GenerationError>;

/// Door generation failures. Callers fall back to the local scenario pools.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("door generation request failed: {0}")]
    Request(String),

    #[error("door generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("door service returned status {0}")]
    Status(u16),

    #[error("door response parsing failed: {0}")]
    Parse(String),
}

/// Produces fresh doors once the catalog for a theme and difficulty runs dry
#[async_trait]
pub trait DoorGenerator: Send + Sync {
    async fn generate(&self, theme: &str, difficulty: u8) -> GenerationResult<Door>;

    /// Name used in logs
    fn name(&self) -> &str;
}

fn difficulty_label(difficulty: u8) -> &'static str {
    match difficulty {
        0 | 1 => "easy",
        2 => "medium",
        _ => "hard",
    }
}

fn difficulty_level(label: &str) -> Option<u8> {
    match label {
        "easy" => Some(1),
        "medium" => Some(2),
        "hard" => Some(3),
        _ => None,
    }
}

/// Asks the external AI service for a new door
pub struct AiServiceDoorGenerator {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl AiServiceDoorGenerator {
    pub fn new(base_url: String, timeout: Duration) -> GenerationResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        Ok(Self {
            base_url,
            timeout,
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct GenerateDoorRequest<'a> {
    theme: &'a str,
    difficulty: &'static str,
    context: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GenerateDoorBody {
    door_id: String,
    content: String,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    expected_solution_types: Vec<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl GenerateDoorBody {
    fn into_door(self, theme: &str, requested: u8) -> GenerationResult<Door> {
        if self.door_id.trim().is_empty() || self.content.trim().is_empty() {
            return Err(GenerationError::Parse("door without id or content".to_string()));
        }
        let difficulty = self
            .difficulty
            .as_deref()
            .and_then(difficulty_level)
            .unwrap_or(requested)
            .clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);

        Ok(Door {
            door_id: self.door_id,
            content: self.content,
            theme: theme.to_string(),
            difficulty,
            expected_solution_types: self.expected_solution_types,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        })
    }
}

#[async_trait]
impl DoorGenerator for AiServiceDoorGenerator {
    async fn generate(&self, theme: &str, difficulty: u8) -> GenerationResult<Door> {
        let body = GenerateDoorRequest {
            theme,
            difficulty: difficulty_label(difficulty),
            context: None,
        };
        let url = format!("{}/doors/generate", self.base_url);

        let response = tokio::time::timeout(self.timeout, self.client.post(&url).json(&body).send())
            .await
            .map_err(|_| GenerationError::Timeout(self.timeout))?
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GenerationError::Status(response.status().as_u16()));
        }

        let parsed: GenerateDoorBody = response
            .json()
            .await
            .map_err(|e| GenerationError::Parse(e.to_string()))?;
        parsed.into_door(theme, difficulty)
    }

    fn name(&self) -> &str {
        "ai-service"
    }
}
