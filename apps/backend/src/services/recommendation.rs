use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::{Config, DefaultStrategy, ProfilingConfig};
use crate::llm::{ChainOutcome, PromptOptions, ProviderChain};
use crate::models::{
    ProblemCandidate, RecommendRequest, RecommendationItem, RecommendationMeta,
    RecommendationResponse, Strategy,
};

use super::cache::ResponseCache;
use super::{candidates, prompt};

/// End-to-end recommendation pipeline: sanitize the request, consult the
/// cache, assemble FSRS candidates, run the provider chain, and map the
/// result (or fall back) into a response with full chain metadata.
/// LLM-path failures never surface as errors.

const MIN_LIMIT: usize = 1;
const MAX_LIMIT: usize = 50;
const MIN_TIMEBOX: u32 = 5;
const MAX_TIMEBOX: u32 = 240;
const OBJECTIVES: [&str; 4] = ["mastery", "coverage", "speed", "interview"];

pub struct RecommendationService {
    chain: ProviderChain,
    cache: ResponseCache,
    profiling: ProfilingConfig,
    domain_whitelist: BTreeSet<String>,
    recent_fallback_limit: i64,
}

impl RecommendationService {
    pub fn new(config: &Config) -> Self {
        Self {
            chain: ProviderChain::from_config(&config.llm),
            cache: ResponseCache::new(Duration::from_secs(config.recommendation.cache_ttl_secs)),
            profiling: config.profiling.clone(),
            domain_whitelist: config
                .profiling
                .known_domains()
                .into_iter()
                .map(String::from)
                .collect(),
            recent_fallback_limit: config.recommendation.recent_fallback_limit,
        }
    }

    pub async fn recommend(
        &self,
        db: &SqlitePool,
        request: RecommendRequest,
    ) -> RecommendationResponse {
        let request = self.sanitize(request);
        let key = ResponseCache::key(&request, prompt::CURRENT_VERSION, self.chain.chain_id());

        if let Some(mut hit) = self.cache.get(key) {
            hit.meta.cached = true;
            metrics::counter!("recommendation_cache_hits_total").increment(1);
            return hit;
        }
        metrics::counter!("recommendation_cache_misses_total").increment(1);

        let mut options = PromptOptions::new(request.limit, prompt::CURRENT_VERSION);
        options.objective = request.objective.clone();
        options.target_domains = request.target_domains.clone();
        options.difficulty_preference = request.difficulty_preference;
        options.timebox_minutes = request.timebox_minutes;

        let candidates = candidates::build_candidates(
            db,
            &self.profiling,
            request.user_id,
            request.limit,
            self.recent_fallback_limit,
        )
        .await;

        let outcome = self
            .chain
            .execute(request.user_id, &candidates, &options)
            .await;
        let response = self.assemble(&request, candidates, outcome);

        metrics::counter!(
            "recommendation_requests_total",
            "strategy" => response.meta.strategy.as_str()
        )
        .increment(1);

        self.cache.insert(key, response.clone());
        response
    }

    fn sanitize(&self, mut request: RecommendRequest) -> RecommendRequest {
        request.limit = request.limit.clamp(MIN_LIMIT, MAX_LIMIT);
        request.timebox_minutes = request
            .timebox_minutes
            .map(|t| t.clamp(MIN_TIMEBOX, MAX_TIMEBOX));
        request.objective = request
            .objective
            .map(|o| o.to_lowercase())
            .filter(|o| OBJECTIVES.contains(&o.as_str()));

        let mut domains: Vec<String> = request
            .target_domains
            .into_iter()
            .map(|d| d.to_lowercase())
            .filter(|d| self.domain_whitelist.contains(d))
            .collect();
        domains.sort();
        domains.dedup();
        request.target_domains = domains;
        request
    }

    fn assemble(
        &self,
        request: &RecommendRequest,
        candidates: Vec<ProblemCandidate>,
        outcome: ChainOutcome,
    ) -> RecommendationResponse {
        let trace_id = Uuid::new_v4().to_string();

        if outcome.success {
            tracing::debug!(
                provider = outcome.provider.as_deref().unwrap_or("unknown"),
                model = outcome.model.as_deref().unwrap_or("unknown"),
                items = outcome.items.len(),
                "LLM ranking succeeded"
            );
            let by_id: HashMap<i64, &ProblemCandidate> =
                candidates.iter().map(|c| (c.problem_id, c)).collect();
            let provider = outcome
                .provider
                .clone()
                .unwrap_or_else(|| "llm".to_string());

            // Preserve the provider's ordering; drop ids it invented.
            let items: Vec<RecommendationItem> = outcome
                .items
                .iter()
                .filter_map(|item| {
                    by_id.get(&item.problem_id).map(|candidate| RecommendationItem {
                        problem_id: item.problem_id,
                        title: candidate.title.clone(),
                        difficulty: candidate.difficulty,
                        reason: item.reason.clone(),
                        confidence: item.confidence.clamp(0.0, 1.0),
                        score: item.score.clamp(0.0, 1.0),
                        source: provider.clone(),
                    })
                })
                .take(request.limit)
                .collect();

            return RecommendationResponse {
                items,
                meta: RecommendationMeta {
                    trace_id,
                    cached: false,
                    strategy: Strategy::Llm,
                    chain_hops: outcome.hops,
                    fallback_reason: None,
                    chain_id: self.chain.chain_id().to_string(),
                    prompt_version: prompt::CURRENT_VERSION.to_string(),
                    policy_id: self.chain.default_strategy().as_str().to_string(),
                },
            };
        }

        let (strategy, items) = match outcome.strategy {
            DefaultStrategy::BusyMessage => (Strategy::BusyMessage, Vec::new()),
            DefaultStrategy::FsrsFallback => {
                let items = candidates
                    .iter()
                    .take(request.limit)
                    .map(|candidate| RecommendationItem {
                        problem_id: candidate.problem_id,
                        title: candidate.title.clone(),
                        difficulty: candidate.difficulty,
                        reason: fallback_reason_text(candidate),
                        confidence: candidate.urgency_score,
                        score: candidate.urgency_score,
                        source: "FSRS".to_string(),
                    })
                    .collect();
                (Strategy::FsrsFallback, items)
            }
        };

        RecommendationResponse {
            items,
            meta: RecommendationMeta {
                trace_id,
                cached: false,
                strategy,
                chain_hops: outcome.hops,
                fallback_reason: outcome.default_reason,
                chain_id: self.chain.chain_id().to_string(),
                prompt_version: prompt::CURRENT_VERSION.to_string(),
                policy_id: self.chain.default_strategy().as_str().to_string(),
            },
        }
    }
}

/// Reason text for FSRS-fallback items, derived from the card signals.
fn fallback_reason_text(candidate: &ProblemCandidate) -> String {
    if candidate.days_overdue > 0 {
        format!(
            "Overdue by {} day{}; recall estimated at {:.0}%",
            candidate.days_overdue,
            if candidate.days_overdue == 1 { "" } else { "s" },
            candidate.retention_probability * 100.0
        )
    } else if candidate.attempts == 0 {
        format!("Not attempted yet; start building {} coverage", candidate.topic)
    } else {
        format!(
            "Recall estimated at {:.0}% after {} attempt{}",
            candidate.retention_probability * 100.0,
            candidate.attempts,
            if candidate.attempts == 1 { "" } else { "s" }
        )
    }
}
