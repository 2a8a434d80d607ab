use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::problem::ProblemDifficulty;

/// A problem enriched with FSRS-derived urgency signals, supplied to the
/// ranking providers. Constructed per request and discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemCandidate {
    pub problem_id: i64,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub title: String,
    pub topic: String,
    pub difficulty: ProblemDifficulty,
    pub tags: Vec<String>,
    /// Review count for this (user, problem).
    pub attempts: i32,
    /// Heuristic recent accuracy in [0, 1].
    pub recent_accuracy: f64,
    /// Predicted recall probability in [0, 1].
    pub retention_probability: f64,
    pub days_overdue: i64,
    /// Composite urgency in [0, 1]; higher means review sooner.
    pub urgency_score: f64,
}

/// One entry of a provider's ranking output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedItem {
    pub problem_id: i64,
    pub reason: String,
    pub confidence: f64,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

/// How the response items were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Llm,
    FsrsFallback,
    BusyMessage,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Llm => "llm",
            Strategy::FsrsFallback => "fsrs_fallback",
            Strategy::BusyMessage => "busy_message",
        }
    }

    /// Value for the `X-Rec-Source` response header.
    pub fn source_header(&self) -> &'static str {
        match self {
            Strategy::Llm => "LLM",
            Strategy::FsrsFallback => "FSRS",
            Strategy::BusyMessage => "DEFAULT",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationItem {
    pub problem_id: i64,
    pub title: String,
    pub difficulty: ProblemDifficulty,
    pub reason: String,
    pub confidence: f64,
    pub score: f64,
    /// Provider name for LLM items, "FSRS" for fallback items.
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationMeta {
    pub trace_id: String,
    pub cached: bool,
    pub strategy: Strategy,
    /// Provider names visited, in order, ending with "default" when no
    /// provider succeeded.
    pub chain_hops: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub chain_id: String,
    pub prompt_version: String,
    pub policy_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResponse {
    pub items: Vec<RecommendationItem>,
    pub meta: RecommendationMeta,
}

/// Sanitized recommendation request; see the service for clamping rules.
#[derive(Debug, Clone)]
pub struct RecommendRequest {
    pub user_id: i64,
    pub limit: usize,
    pub objective: Option<String>,
    pub target_domains: Vec<String>,
    pub difficulty_preference: Option<ProblemDifficulty>,
    pub timebox_minutes: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Helpful,
    NotHelpful,
    Mastered,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::Helpful => "helpful",
            FeedbackKind::NotHelpful => "not_helpful",
            FeedbackKind::Mastered => "mastered",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitFeedback {
    pub user_id: i64,
    pub feedback: FeedbackKind,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    pub status: &'static str,
    pub recorded_at: DateTime<Utc>,
}
