use super::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Scores responses through the external AI service
pub struct AiServiceScorer {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl AiServiceScorer {
    pub fn new(base_url: String, timeout: Duration) -> ScoringResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScoringError::Request(e.to_string()))?;

        Ok(Self {
            base_url,
            timeout,
            client,
        })
    }
}

#[derive(Debug, Serialize)]
struct ScoreResponseRequest<'a> {
    response_id: &'a str,
    door_content: &'a str,
    response: &'a str,
    context: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ScoreResponseBody {
    metrics: ServiceMetrics,
}

#[derive(Debug, Deserialize)]
struct ServiceMetrics {
    creativity: f64,
    feasibility: f64,
    humor: f64,
    originality: f64,
}

fn to_score(value: f64) -> u32 {
    value.round().clamp(0.0, 100.0) as u32
}

impl From<ServiceMetrics> for ScoringMetrics {
    fn from(m: ServiceMetrics) -> Self {
        ScoringMetrics {
            creativity: to_score(m.creativity),
            feasibility: to_score(m.feasibility),
            humor: to_score(m.humor),
            originality: to_score(m.originality),
        }
    }
}

#[async_trait]
impl Scorer for AiServiceScorer {
    async fn score(&self, request: &ScoreRequest) -> ScoringResult<ScoringMetrics> {
        let start = Instant::now();
        let body = ScoreResponseRequest {
            response_id: &request.response_id,
            door_content: &request.door_content,
            response: &request.response,
            context: None,
        };

        let url = format!("{}/scoring/score-response", self.base_url);

        let response = tokio::time::timeout(self.timeout, self.client.post(&url).json(&body).send())
            .await
            .map_err(|_| ScoringError::Timeout(self.timeout))?
            .map_err(|e| ScoringError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ScoringError::Status(response.status().as_u16()));
        }

        let parsed: ScoreResponseBody = response
            .json()
            .await
            .map_err(|e| ScoringError::Parse(e.to_string()))?;

        tracing::debug!(
            "Scored response {} in {}ms",
            request.response_id,
            start.elapsed().as_millis()
        );

        Ok(parsed.metrics.into())
    }

    fn name(&self) -> &str {
        "ai-service"
    }
}
