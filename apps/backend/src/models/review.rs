use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::card::CardState;

/// How a review was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum ReviewType {
    Scheduled,
    Extra,
    Cram,
    Manual,
    Bulk,
}

impl Default for ReviewType {
    fn default() -> Self {
        ReviewType::Scheduled
    }
}

/// Append-only record of a single review. Immutable once written;
/// references the card by (user, problem) only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ReviewLog {
    pub id: String,
    pub user_id: i64,
    pub problem_id: i64,
    pub rating: i32,
    pub review_type: ReviewType,
    /// Whole days elapsed since the previous review at the time of this one.
    pub elapsed_days: i32,
    /// Stability before this review was applied.
    pub stability_before: f64,
    /// Difficulty before this review was applied.
    pub difficulty_before: f64,
    pub reviewed_at: DateTime<Utc>,
}

impl ReviewLog {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: i64,
        problem_id: i64,
        rating: i32,
        review_type: ReviewType,
        elapsed_days: i32,
        stability_before: f64,
        difficulty_before: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            problem_id,
            rating,
            review_type,
            elapsed_days,
            stability_before,
            difficulty_before,
            reviewed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReview {
    pub user_id: i64,
    pub problem_id: i64,
    pub rating: i32,
    #[serde(default)]
    pub review_type: ReviewType,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReviewResponse {
    pub success: bool,
    pub message: String,
    pub next_review_date: DateTime<Utc>,
    pub new_state: CardState,
    /// Preview of the Again/Hard/Good/Easy intervals for the updated card.
    pub intervals: [i64; 4],
}
