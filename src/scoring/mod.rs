mod ai_service;
mod heuristic;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use ai_service::AiServiceScorer;
pub use heuristic::HeuristicScorer;

use crate::config::AppConfig;
use crate::types::ScoringMetrics;

/// Result type for scoring operations
pub type ScoringResult<T> = Result<T, ScoringError>;

/// Errors that can occur while scoring a response. Never fatal for the game:
/// callers fall back to neutral metrics.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("scoring request failed: {0}")]
    Request(String),

    #[error("scoring timed out after {0:?}")]
    Timeout(Duration),

    #[error("scoring service returned status {0}")]
    Status(u16),

    #[error("scoring response parsing failed: {0}")]
    Parse(String),
}

/// What a scorer needs to judge a response
#[derive(Debug, Clone)]
pub struct ScoreRequest {
    pub response_id: String,
    pub door_content: String,
    pub response: String,
}

#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, request: &ScoreRequest) -> ScoringResult<ScoringMetrics>;

    /// Name used in logs and metrics
    fn name(&self) -> &str;
}

/// Score with the given scorer, substituting neutral metrics on failure.
///
/// The boolean is true when the fallback was used.
pub async fn score_or_fallback(scorer: &dyn Scorer, request: &ScoreRequest) -> (ScoringMetrics, bool) {
    match scorer.score(request).await {
        Ok(metrics) => (metrics, false),
        Err(e) => {
            tracing::warn!(
                "Scorer {} failed for response {}: {}. Using fallback metrics.",
                scorer.name(),
                request.response_id,
                e
            );
            (ScoringMetrics::FALLBACK, true)
        }
    }
}

/// Pick the scorer for this deployment: the AI service when configured, the
/// local heuristic otherwise
pub fn build_scorer(config: &AppConfig) -> ScoringResult<Arc<dyn Scorer>> {
    match &config.ai_service_url {
        Some(url) => {
            let scorer = AiServiceScorer::new(url.clone(), config.ai_timeout)?;
            tracing::info!("Scoring responses with AI service at {}", url);
            Ok(Arc::new(scorer))
        }
        None => {
            tracing::info!("AI_SERVICE_URL not set, scoring responses locally");
            Ok(Arc::new(HeuristicScorer))
        }
    }
}
