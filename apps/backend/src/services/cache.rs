use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::models::{RecommendRequest, RecommendationResponse};

/// TTL cache for recommendation responses. Writes are idempotent and
/// concurrent writers race last-write-wins, which is acceptable for
/// per-user recommendation payloads.
pub struct ResponseCache {
    entries: DashMap<u64, CacheEntry>,
    ttl: Duration,
}

struct CacheEntry {
    stored_at: Instant,
    response: RecommendationResponse,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Cache key over everything that affects the computed response,
    /// including the prompt version and chain id so a rollout of either
    /// invalidates old entries.
    pub fn key(request: &RecommendRequest, prompt_version: &str, chain_id: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        request.user_id.hash(&mut hasher);
        request.limit.hash(&mut hasher);
        request.objective.hash(&mut hasher);

        let mut domains = request.target_domains.clone();
        domains.sort();
        domains.hash(&mut hasher);

        request
            .difficulty_preference
            .map(|d| d.to_string())
            .hash(&mut hasher);
        request.timebox_minutes.hash(&mut hasher);
        prompt_version.hash(&mut hasher);
        chain_id.hash(&mut hasher);
        hasher.finish()
    }

    pub fn get(&self, key: u64) -> Option<RecommendationResponse> {
        let expired = match self.entries.get(&key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                return Some(entry.response.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(&key);
        }
        None
    }

    pub fn insert(&self, key: u64, response: RecommendationResponse) {
        self.entries.insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                response,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecommendationMeta, Strategy};

    fn request(user_id: i64) -> RecommendRequest {
        RecommendRequest {
            user_id,
            limit: 10,
            objective: None,
            target_domains: vec!["graphs".to_string(), "arrays".to_string()],
            difficulty_preference: None,
            timebox_minutes: None,
        }
    }

    fn response(trace: &str) -> RecommendationResponse {
        RecommendationResponse {
            items: vec![],
            meta: RecommendationMeta {
                trace_id: trace.to_string(),
                cached: false,
                strategy: Strategy::FsrsFallback,
                chain_hops: vec![],
                fallback_reason: None,
                chain_id: "chain-v1".to_string(),
                prompt_version: "v2".to_string(),
                policy_id: "fsrs_fallback".to_string(),
            },
        }
    }

    #[test]
    fn test_round_trip_within_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let key = ResponseCache::key(&request(1), "v2", "chain-v1");
        cache.insert(key, response("t-1"));

        let hit = cache.get(key).expect("entry should still be live");
        assert_eq!(hit.meta.trace_id, "t-1");
    }

    #[test]
    fn test_expired_entries_are_dropped() {
        let cache = ResponseCache::new(Duration::ZERO);
        let key = ResponseCache::key(&request(1), "v2", "chain-v1");
        cache.insert(key, response("t-1"));
        assert!(cache.get(key).is_none());
    }

    #[test]
    fn test_key_ignores_domain_order() {
        let mut a = request(1);
        let mut b = request(1);
        a.target_domains = vec!["graphs".to_string(), "arrays".to_string()];
        b.target_domains = vec!["arrays".to_string(), "graphs".to_string()];
        assert_eq!(
            ResponseCache::key(&a, "v2", "chain-v1"),
            ResponseCache::key(&b, "v2", "chain-v1")
        );
    }

    #[test]
    fn test_key_varies_with_inputs() {
        let base = ResponseCache::key(&request(1), "v2", "chain-v1");
        assert_ne!(base, ResponseCache::key(&request(2), "v2", "chain-v1"));
        assert_ne!(base, ResponseCache::key(&request(1), "v1", "chain-v1"));
        assert_ne!(base, ResponseCache::key(&request(1), "v2", "chain-v2"));

        let mut wider = request(1);
        wider.limit = 20;
        assert_ne!(base, ResponseCache::key(&wider, "v2", "chain-v1"));
    }
}
