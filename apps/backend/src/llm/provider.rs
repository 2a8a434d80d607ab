use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{ProblemCandidate, ProblemDifficulty, RankedItem};

/// Classification of provider failures. The chain uses these to decide
/// whether to descend to the next node or default immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    #[serde(rename = "API_KEY_MISSING")]
    ApiKeyMissing,
    #[serde(rename = "TIMEOUT")]
    Timeout,
    #[serde(rename = "HTTP_5XX")]
    Http5xx,
    #[serde(rename = "HTTP_4XX")]
    Http4xx,
    #[serde(rename = "PARSE_ERROR")]
    ParseError,
    #[serde(rename = "RATE_LIMITED")]
    RateLimited,
    #[serde(rename = "NETWORK")]
    Network,
    #[serde(rename = "OTHER")]
    Other,
}

impl ErrorClass {
    /// Lowercase form used in fallback reasons and metric labels.
    pub fn reason(&self) -> &'static str {
        match self {
            ErrorClass::ApiKeyMissing => "api_key_missing",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Http5xx => "http_5xx",
            ErrorClass::Http4xx => "http_4xx",
            ErrorClass::ParseError => "parse_error",
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::Network => "network",
            ErrorClass::Other => "other",
        }
    }

    /// Worth retrying on the same node.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorClass::Timeout | ErrorClass::Network | ErrorClass::Http5xx
        )
    }
}

/// Per-request options handed to providers and the prompt builder.
#[derive(Debug, Clone)]
pub struct PromptOptions {
    pub limit: usize,
    pub prompt_version: String,
    pub objective: Option<String>,
    pub target_domains: Vec<String>,
    pub difficulty_preference: Option<ProblemDifficulty>,
    pub timebox_minutes: Option<u32>,
}

impl PromptOptions {
    pub fn new(limit: usize, prompt_version: &str) -> Self {
        Self {
            limit,
            prompt_version: prompt_version.to_string(),
            objective: None,
            target_domains: Vec::new(),
            difficulty_preference: None,
            timebox_minutes: None,
        }
    }
}

/// Result of one provider invocation.
#[derive(Debug, Clone)]
pub struct RankOutcome {
    pub success: bool,
    pub provider: String,
    pub model: Option<String>,
    pub error_class: Option<ErrorClass>,
    /// Human-readable detail, or the signalled strategy for the default
    /// provider.
    pub error: Option<String>,
    pub items: Vec<RankedItem>,
    pub latency_ms: u64,
}

impl RankOutcome {
    pub fn ranked(
        provider: impl Into<String>,
        model: Option<String>,
        items: Vec<RankedItem>,
        latency_ms: u64,
    ) -> Self {
        Self {
            success: true,
            provider: provider.into(),
            model,
            error_class: None,
            error: None,
            items,
            latency_ms,
        }
    }

    pub fn failed(
        provider: impl Into<String>,
        class: ErrorClass,
        detail: impl Into<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            success: false,
            provider: provider.into(),
            model: None,
            error_class: Some(class),
            error: Some(detail.into()),
            items: Vec::new(),
            latency_ms,
        }
    }
}

/// A ranking provider. Implementations are stateless apart from their
/// HTTP client and must map failures onto `ErrorClass`.
#[async_trait]
pub trait RankProvider: Send + Sync {
    /// Provider name used in chain hops and metric labels.
    fn name(&self) -> &'static str;

    async fn rank(&self, candidates: &[ProblemCandidate], options: &PromptOptions) -> RankOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_class_wire_names() {
        let json = serde_json::to_string(&ErrorClass::Http5xx).unwrap();
        assert_eq!(json, "\"HTTP_5XX\"");
        let parsed: ErrorClass = serde_json::from_str("\"API_KEY_MISSING\"").unwrap();
        assert_eq!(parsed, ErrorClass::ApiKeyMissing);
    }

    #[test]
    fn test_transient_classes() {
        assert!(ErrorClass::Timeout.is_transient());
        assert!(ErrorClass::Network.is_transient());
        assert!(ErrorClass::Http5xx.is_transient());
        assert!(!ErrorClass::ApiKeyMissing.is_transient());
        assert!(!ErrorClass::RateLimited.is_transient());
        assert!(!ErrorClass::ParseError.is_transient());
    }
}
