use async_trait::async_trait;

use crate::models::{ProblemCandidate, RankedItem};

use super::provider::{PromptOptions, RankOutcome, RankProvider};

/// Deterministic provider for tests and local development: echoes the
/// first `limit` candidates back with neutral scores.
pub struct MockProvider;

#[async_trait]
impl RankProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn rank(&self, candidates: &[ProblemCandidate], options: &PromptOptions) -> RankOutcome {
        let items: Vec<RankedItem> = candidates
            .iter()
            .take(options.limit)
            .map(|candidate| RankedItem {
                problem_id: candidate.problem_id,
                reason: format!("Practice {}", candidate.topic),
                confidence: 0.5,
                score: 0.5,
                strategy: Some("mock".to_string()),
            })
            .collect();

        RankOutcome::ranked(self.name(), None, items, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProblemDifficulty;
    use crate::services::prompt;

    fn candidates(count: usize) -> Vec<ProblemCandidate> {
        (0..count)
            .map(|i| ProblemCandidate {
                problem_id: i as i64 + 1,
                title: format!("Problem {}", i + 1),
                topic: "arrays".to_string(),
                difficulty: ProblemDifficulty::Easy,
                tags: vec![],
                attempts: 0,
                recent_accuracy: 0.5,
                retention_probability: 0.5,
                days_overdue: 0,
                urgency_score: 0.5,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_mock_respects_limit_and_order() {
        let provider = MockProvider;
        let options = PromptOptions::new(2, prompt::CURRENT_VERSION);
        let outcome = provider.rank(&candidates(5), &options).await;

        assert!(outcome.success);
        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.items[0].problem_id, 1);
        assert_eq!(outcome.items[1].problem_id, 2);
    }
}
