use super::*;

const CREATIVE_WORDS: &[&str] = &[
    "creative",
    "innovative",
    "unique",
    "original",
    "artistic",
    "imaginative",
];
const HUMOR_WORDS: &[&str] = &[
    "funny", "hilarious", "joke", "laugh", "comedy", "amusing", "witty",
];
const PRACTICAL_WORDS: &[&str] = &[
    "practical",
    "realistic",
    "feasible",
    "logical",
    "sensible",
    "reasonable",
];

fn mentions_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// Local scorer based on response length and a few keywords
pub struct HeuristicScorer;

impl HeuristicScorer {
    pub fn metrics_for(response: &str) -> ScoringMetrics {
        let len = response.chars().count();
        let lower = response.to_lowercase();

        let mut creativity = 50u32;
        let mut feasibility = 50u32;
        let mut humor = 50u32;
        let mut originality = 50u32;

        if len > 100 {
            creativity += 20;
            originality += 15;
        }
        if len > 200 {
            creativity += 10;
            humor += 10;
        }
        if mentions_any(&lower, CREATIVE_WORDS) {
            creativity += 15;
            originality += 10;
        }
        if mentions_any(&lower, HUMOR_WORDS) {
            humor += 20;
        }
        if mentions_any(&lower, PRACTICAL_WORDS) {
            feasibility += 15;
        }

        ScoringMetrics {
            creativity: creativity.min(100),
            feasibility: feasibility.min(100),
            humor: humor.min(100),
            originality: originality.min(100),
        }
    }
}

#[async_trait]
impl Scorer for HeuristicScorer {
    async fn score(&self, request: &ScoreRequest) -> ScoringResult<ScoringMetrics> {
        Ok(Self::metrics_for(&request.response))
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}
