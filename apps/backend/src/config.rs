//! Application Configuration
//!
//! Centralized configuration loaded from environment variables with
//! defaults. The chain topology can be replaced wholesale through the
//! `LLM_CHAIN_NODES` JSON variable; API keys are always referenced by
//! environment-variable *name*, never held here as literals.

use std::collections::HashMap;
use std::env;

use serde::Deserialize;

use crate::llm::ErrorClass;
use crate::services::fsrs::FsrsParameters;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub fsrs: FsrsConfig,
    pub recommendation: RecommendationConfig,
    pub similarity: SimilarityConfig,
    pub profiling: ProfilingConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// One node of the provider chain, in execution order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainNodeConfig {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_node_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Error classes that let the chain descend to the next node; any
    /// other failure defaults immediately.
    #[serde(default)]
    pub on_errors_to_next: Vec<ErrorClass>,
}

fn default_enabled() -> bool {
    true
}

fn default_node_timeout_ms() -> u64 {
    8_000
}

fn default_retry_attempts() -> u32 {
    2
}

/// What the terminal default provider signals to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultStrategy {
    FsrsFallback,
    BusyMessage,
}

impl DefaultStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefaultStrategy::FsrsFallback => "fsrs_fallback",
            DefaultStrategy::BusyMessage => "busy_message",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "fsrs_fallback" => Some(DefaultStrategy::FsrsFallback),
            "busy_message" => Some(DefaultStrategy::BusyMessage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Feature toggle for the whole ranking chain.
    pub enabled: bool,
    pub chain_id: String,
    pub nodes: Vec<ChainNodeConfig>,
    pub default_strategy: DefaultStrategy,
    pub openai: OpenAiConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub global_per_minute: u32,
    pub per_user_per_minute: u32,
}

#[derive(Debug, Clone)]
pub struct FsrsConfig {
    pub default_parameters: FsrsParameters,
}

#[derive(Debug, Clone)]
pub struct RecommendationConfig {
    pub cache_ttl_secs: u64,
    /// How many recent problems back the cold-start fallback.
    pub recent_fallback_limit: i64,
}

#[derive(Debug, Clone)]
pub struct SimilarityConfig {
    pub tag_weight: f64,
    pub category_weight: f64,
    pub difficulty_weight: f64,
    /// Similarity assigned when both feature sets are empty.
    pub empty_feature_similarity: f64,
}

#[derive(Debug, Clone)]
pub struct ProfilingConfig {
    /// tag -> practice domain; the value set doubles as the whitelist
    /// for request `domains`.
    pub tag_domain_mapping: HashMap<String, String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig::from_env(),
            database: DatabaseConfig::from_env(),
            llm: LlmConfig::from_env(),
            fsrs: FsrsConfig::from_env(),
            recommendation: RecommendationConfig::from_env(),
            similarity: SimilarityConfig::from_env(),
            profiling: ProfilingConfig::from_env(),
        }
    }
}

impl ServerConfig {
    fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
            log_level: env::var("LOG_LEVEL")
                .unwrap_or_else(|_| "drill_backend=debug,tower_http=debug".to_string()),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DatabaseConfig {
    fn from_env() -> Self {
        Self {
            url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:drill.db?mode=rwc".to_string()),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|c| c.parse().ok())
                .unwrap_or(5),
        }
    }
}

impl LlmConfig {
    fn from_env() -> Self {
        let openai = OpenAiConfig::from_env();

        let nodes = match env::var("LLM_CHAIN_NODES") {
            Ok(raw) => match serde_json::from_str::<Vec<ChainNodeConfig>>(&raw) {
                Ok(nodes) => nodes,
                Err(e) => {
                    tracing::warn!("Ignoring malformed LLM_CHAIN_NODES: {}", e);
                    Self::default_nodes(&openai)
                }
            },
            Err(_) => Self::default_nodes(&openai),
        };

        let default_strategy = env::var("LLM_DEFAULT_STRATEGY")
            .ok()
            .and_then(|s| DefaultStrategy::parse(&s))
            .unwrap_or(DefaultStrategy::FsrsFallback);

        Self {
            enabled: env::var("LLM_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            chain_id: env::var("LLM_CHAIN_ID").unwrap_or_else(|_| "chain-v1".to_string()),
            nodes,
            default_strategy,
            openai,
            rate_limit: RateLimitConfig {
                global_per_minute: env::var("LLM_GLOBAL_RATE_PER_MINUTE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(120),
                per_user_per_minute: env::var("LLM_USER_RATE_PER_MINUTE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            },
        }
    }

    fn default_nodes(openai: &OpenAiConfig) -> Vec<ChainNodeConfig> {
        vec![ChainNodeConfig {
            name: "openai".to_string(),
            enabled: true,
            timeout_ms: openai.timeout_ms,
            retry_attempts: 2,
            on_errors_to_next: vec![
                ErrorClass::Timeout,
                ErrorClass::Http5xx,
                ErrorClass::Network,
                ErrorClass::RateLimited,
            ],
        }]
    }
}

impl OpenAiConfig {
    fn from_env() -> Self {
        Self {
            base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            api_key_env: env::var("OPENAI_API_KEY_ENV")
                .unwrap_or_else(|_| "OPENAI_API_KEY".to_string()),
            timeout_ms: env::var("OPENAI_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8_000),
        }
    }
}

impl FsrsConfig {
    fn from_env() -> Self {
        let mut params = FsrsParameters::default();

        if let Ok(raw) = env::var("FSRS_WEIGHTS") {
            let weights: Vec<f64> = raw
                .split(',')
                .filter_map(|w| w.trim().parse().ok())
                .collect();
            if weights.len() == 17 {
                params.w.copy_from_slice(&weights);
            } else {
                tracing::warn!(
                    "FSRS_WEIGHTS must hold 17 comma-separated numbers, got {}",
                    weights.len()
                );
            }
        }
        if let Ok(retention) = env::var("FSRS_REQUEST_RETENTION") {
            if let Ok(value) = retention.parse() {
                params.request_retention = value;
            }
        }
        if !params.is_valid() {
            tracing::warn!("Configured FSRS parameters are invalid, using defaults");
            params = FsrsParameters::default();
        }

        Self {
            default_parameters: params,
        }
    }
}

impl RecommendationConfig {
    fn from_env() -> Self {
        Self {
            cache_ttl_secs: env::var("RECOMMENDATION_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3_600),
            recent_fallback_limit: env::var("RECOMMENDATION_RECENT_FALLBACK_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
        }
    }
}

impl SimilarityConfig {
    fn from_env() -> Self {
        fn weight(name: &str, default: f64) -> f64 {
            env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }
        Self {
            tag_weight: weight("SIMILARITY_TAG_WEIGHT", 0.5),
            category_weight: weight("SIMILARITY_CATEGORY_WEIGHT", 0.3),
            difficulty_weight: weight("SIMILARITY_DIFFICULTY_WEIGHT", 0.2),
            empty_feature_similarity: weight("SIMILARITY_EMPTY_FEATURE", 0.1),
        }
    }
}

impl ProfilingConfig {
    fn from_env() -> Self {
        let mapping = match env::var("TAG_DOMAIN_MAPPING") {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(mapping) => mapping,
                Err(e) => {
                    tracing::warn!("Ignoring malformed TAG_DOMAIN_MAPPING: {}", e);
                    Self::default_mapping()
                }
            },
            Err(_) => Self::default_mapping(),
        };
        Self {
            tag_domain_mapping: mapping,
        }
    }

    fn default_mapping() -> HashMap<String, String> {
        [
            ("array", "arrays"),
            ("two-pointers", "arrays"),
            ("sliding-window", "arrays"),
            ("string", "strings"),
            ("hash-table", "hashing"),
            ("linked-list", "linked-lists"),
            ("stack", "stacks-queues"),
            ("queue", "stacks-queues"),
            ("tree", "trees"),
            ("binary-tree", "trees"),
            ("binary-search-tree", "trees"),
            ("heap", "heaps"),
            ("graph", "graphs"),
            ("bfs", "graphs"),
            ("dfs", "graphs"),
            ("binary-search", "searching"),
            ("sorting", "sorting"),
            ("greedy", "greedy"),
            ("backtracking", "backtracking"),
            ("dynamic-programming", "dynamic-programming"),
            ("bit-manipulation", "math"),
            ("math", "math"),
        ]
        .into_iter()
        .map(|(tag, domain)| (tag.to_string(), domain.to_string()))
        .collect()
    }

    /// The set of valid request domains.
    pub fn known_domains(&self) -> std::collections::BTreeSet<&str> {
        self.tag_domain_mapping
            .values()
            .map(String::as_str)
            .collect()
    }

    pub fn domain_for_tag(&self, tag: &str) -> Option<&str> {
        self.tag_domain_mapping.get(tag).map(String::as_str)
    }
}
