use async_trait::async_trait;

use crate::config::DefaultStrategy;
use crate::models::ProblemCandidate;

use super::provider::{PromptOptions, RankOutcome, RankProvider};

/// The terminal node of every chain. It never succeeds; its only job is
/// to signal the configured fallback strategy to the recommendation
/// service.
pub struct DefaultProvider {
    strategy: DefaultStrategy,
}

impl DefaultProvider {
    pub fn new(strategy: DefaultStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> DefaultStrategy {
        self.strategy
    }
}

#[async_trait]
impl RankProvider for DefaultProvider {
    fn name(&self) -> &'static str {
        "default"
    }

    async fn rank(&self, _candidates: &[ProblemCandidate], _options: &PromptOptions) -> RankOutcome {
        RankOutcome {
            success: false,
            provider: self.name().to_string(),
            model: None,
            error_class: None,
            error: Some(self.strategy.as_str().to_string()),
            items: Vec::new(),
            latency_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::prompt;

    #[tokio::test]
    async fn test_default_provider_never_succeeds() {
        let provider = DefaultProvider::new(DefaultStrategy::BusyMessage);
        let options = PromptOptions::new(5, prompt::CURRENT_VERSION);
        let outcome = provider.rank(&[], &options).await;

        assert!(!outcome.success);
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.error.as_deref(), Some("busy_message"));
    }
}
