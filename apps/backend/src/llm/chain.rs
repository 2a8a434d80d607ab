use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ChainNodeConfig, DefaultStrategy, LlmConfig};
use crate::models::{ProblemCandidate, RankedItem};

use super::default_provider::DefaultProvider;
use super::mock::MockProvider;
use super::openai::OpenAiProvider;
use super::provider::{ErrorClass, PromptOptions, RankOutcome, RankProvider};
use super::rate_limit::RateGate;

/// What the chain hands back to the recommendation service. Never an
/// error: failing all the way through is a controlled fallback.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    pub success: bool,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub items: Vec<RankedItem>,
    /// Provider names actually visited, ending with "default" when no
    /// provider succeeded.
    pub hops: Vec<String>,
    /// Why the chain defaulted: the last error class, or the default
    /// strategy name when no node ran.
    pub default_reason: Option<String>,
    /// Fallback policy signalled by the default provider.
    pub strategy: DefaultStrategy,
}

/// Ordered list of ranking providers with per-node resilience, walked
/// until one succeeds or the terminal default provider is reached.
pub struct ProviderChain {
    enabled: bool,
    chain_id: String,
    nodes: Vec<ChainNodeConfig>,
    catalog: HashMap<String, Arc<dyn RankProvider>>,
    default_provider: DefaultProvider,
    gate: RateGate,
}

impl ProviderChain {
    pub fn new(
        enabled: bool,
        chain_id: String,
        nodes: Vec<ChainNodeConfig>,
        catalog: HashMap<String, Arc<dyn RankProvider>>,
        default_strategy: DefaultStrategy,
        gate: RateGate,
    ) -> Self {
        Self {
            enabled,
            chain_id,
            nodes,
            catalog,
            default_provider: DefaultProvider::new(default_strategy),
            gate,
        }
    }

    /// Build the chain from configuration with the standard catalog.
    pub fn from_config(config: &LlmConfig) -> Self {
        let mut catalog: HashMap<String, Arc<dyn RankProvider>> = HashMap::new();
        catalog.insert(
            "openai".to_string(),
            Arc::new(OpenAiProvider::new(config.openai.clone())),
        );
        catalog.insert("mock".to_string(), Arc::new(MockProvider));

        Self::new(
            config.enabled,
            config.chain_id.clone(),
            config.nodes.clone(),
            catalog,
            config.default_strategy,
            RateGate::new(&config.rate_limit),
        )
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn default_strategy(&self) -> DefaultStrategy {
        self.default_provider.strategy()
    }

    pub async fn execute(
        &self,
        user_id: i64,
        candidates: &[ProblemCandidate],
        options: &PromptOptions,
    ) -> ChainOutcome {
        if !self.enabled {
            metrics::counter!("llm_chain_disabled_total").increment(1);
            return self.defaulted(Vec::new(), Some("llm_disabled".to_string()));
        }
        if self.nodes.is_empty() {
            return self
                .invoke_default(candidates, options, Vec::new(), Some("chain_empty".to_string()))
                .await;
        }

        let mut hops = Vec::new();
        let mut last_error: Option<ErrorClass> = None;

        for node in &self.nodes {
            if !node.enabled {
                continue;
            }
            let Some(provider) = self.catalog.get(&node.name) else {
                tracing::warn!("Chain node {:?} has no provider in the catalog", node.name);
                continue;
            };

            hops.push(node.name.clone());
            let outcome = self
                .run_node(user_id, node, provider.as_ref(), candidates, options)
                .await;

            let label = if outcome.success { "success" } else { "failure" };
            metrics::histogram!(
                "llm_provider_latency_ms",
                "provider" => node.name.clone(),
                "outcome" => label
            )
            .record(outcome.latency_ms as f64);

            if outcome.success {
                tracing::debug!(provider = %node.name, "Chain satisfied");
                metrics::histogram!("llm_chain_hops").record(hops.len() as f64);
                return ChainOutcome {
                    success: true,
                    provider: Some(outcome.provider),
                    model: outcome.model,
                    items: outcome.items,
                    hops,
                    default_reason: None,
                    strategy: self.default_strategy(),
                };
            }

            let class = outcome.error_class.unwrap_or(ErrorClass::Other);
            last_error = Some(class);

            if node.on_errors_to_next.contains(&class) {
                tracing::debug!(
                    provider = %node.name,
                    class = class.reason(),
                    "Descending to next chain node"
                );
                continue;
            }

            tracing::warn!(
                provider = %node.name,
                class = class.reason(),
                error = outcome.error.as_deref().unwrap_or(""),
                "Chain halted, defaulting"
            );
            break;
        }

        let reason = last_error.map(|class| class.reason().to_string());
        self.invoke_default(candidates, options, hops, reason).await
    }

    /// One node: rate-limit check, then up to `retry_attempts` tries
    /// under the node timeout, retrying only transient classes.
    async fn run_node(
        &self,
        user_id: i64,
        node: &ChainNodeConfig,
        provider: &dyn RankProvider,
        candidates: &[ProblemCandidate],
        options: &PromptOptions,
    ) -> RankOutcome {
        if !self.gate.try_acquire(user_id) {
            metrics::counter!("llm_rate_limited_total", "provider" => node.name.clone())
                .increment(1);
            return RankOutcome::failed(
                provider.name(),
                ErrorClass::RateLimited,
                "rate limiter shed the call",
                0,
            );
        }

        let timeout = Duration::from_millis(node.timeout_ms);
        let attempts = node.retry_attempts.max(1);
        let mut outcome = RankOutcome::failed(provider.name(), ErrorClass::Other, "not invoked", 0);

        for attempt in 1..=attempts {
            outcome = match tokio::time::timeout(timeout, provider.rank(candidates, options)).await
            {
                Ok(outcome) => outcome,
                Err(_) => RankOutcome::failed(
                    provider.name(),
                    ErrorClass::Timeout,
                    format!("no response within {}ms", node.timeout_ms),
                    node.timeout_ms,
                ),
            };

            if outcome.success {
                break;
            }
            let class = outcome.error_class.unwrap_or(ErrorClass::Other);
            if !class.is_transient() || attempt == attempts {
                break;
            }
            tracing::debug!(
                provider = %node.name,
                attempt,
                class = class.reason(),
                "Retrying chain node"
            );
        }

        outcome
    }

    async fn invoke_default(
        &self,
        candidates: &[ProblemCandidate],
        options: &PromptOptions,
        mut hops: Vec<String>,
        reason: Option<String>,
    ) -> ChainOutcome {
        hops.push(self.default_provider.name().to_string());
        let outcome = self.default_provider.rank(candidates, options).await;

        let reason = reason.or(outcome.error);
        metrics::counter!(
            "llm_fallback_total",
            "reason" => reason.clone().unwrap_or_default()
        )
        .increment(1);
        metrics::histogram!("llm_chain_hops").record(hops.len() as f64);

        self.defaulted(hops, reason)
    }

    fn defaulted(&self, hops: Vec<String>, reason: Option<String>) -> ChainOutcome {
        ChainOutcome {
            success: false,
            provider: None,
            model: None,
            items: Vec::new(),
            hops,
            default_reason: reason,
            strategy: self.default_strategy(),
        }
    }
}
