use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{AppResult, OptionExt};
use crate::models::{
    Card, CardState, ReviewLog, SubmitReview, SubmitReviewResponse,
};
use crate::services::fsrs::{self, FsrsParameters};
use crate::services::{optimizer, queue};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/queue", get(get_queue))
        .route("/submit", post(submit_review))
        .route("/intervals", get(get_intervals))
        .route("/optimize-parameters", post(optimize_parameters))
}

/// Serializes reviews per (user, problem) so the read-modify-write on a
/// card stays consistent under concurrent submissions. Other cards and
/// users proceed independently.
#[derive(Default)]
pub struct CardLocks {
    locks: DashMap<(i64, i64), Arc<Mutex<()>>>,
}

impl CardLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    fn acquire(&self, user_id: i64, problem_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .entry((user_id, problem_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Per-user FSRS parameters, falling back to the configured defaults
/// for users without a stored (and valid) set.
async fn load_user_parameters(
    db: &sqlx::SqlitePool,
    user_id: i64,
    defaults: &FsrsParameters,
) -> FsrsParameters {
    let row: Option<(String, f64)> =
        sqlx::query_as("SELECT weights, request_retention FROM fsrs_params WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(db)
            .await
            .ok()
            .flatten();

    if let Some((weights, retention)) = row {
        if let Ok(parsed) = serde_json::from_str::<Vec<f64>>(&weights) {
            if parsed.len() == 17 {
                let mut w = [0.0f64; 17];
                w.copy_from_slice(&parsed);
                let params = FsrsParameters::from_array(w, retention);
                if params.is_valid() {
                    return params;
                }
            }
        }
        tracing::warn!("Stored FSRS parameters for user {} are invalid, using defaults", user_id);
    }
    defaults.clone()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueQuery {
    user_id: i64,
    limit: Option<usize>,
}

async fn get_queue(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QueueQuery>,
) -> AppResult<Json<queue::ReviewQueue>> {
    let review_queue =
        queue::build_queue(&state.db, query.user_id, query.limit.unwrap_or(10)).await?;
    Ok(Json(review_queue))
}

async fn submit_review(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SubmitReview>,
) -> AppResult<Json<SubmitReviewResponse>> {
    let problem: Option<i64> = sqlx::query_scalar("SELECT id FROM problems WHERE id = ?")
        .bind(payload.problem_id)
        .fetch_optional(&state.db)
        .await?;
    problem.ok_or_not_found("Problem", payload.problem_id.to_string())?;

    let lock = state.locks.acquire(payload.user_id, payload.problem_id);
    let _guard = lock.lock().await;

    let card = sqlx::query_as::<_, Card>(
        "SELECT * FROM cards WHERE user_id = ? AND problem_id = ?",
    )
    .bind(payload.user_id)
    .bind(payload.problem_id)
    .fetch_optional(&state.db)
    .await?
    .unwrap_or_else(|| Card::new(payload.user_id, payload.problem_id));

    let params = load_user_parameters(
        &state.db,
        payload.user_id,
        &state.config.fsrs.default_parameters,
    )
    .await;

    let now = Utc::now();
    let result = fsrs::calculate_next_review(&card, payload.rating, &params, now)?;

    // The log records the pre-review memory state.
    let log = ReviewLog::new(
        payload.user_id,
        payload.problem_id,
        payload.rating,
        payload.review_type,
        result.elapsed_days as i32,
        card.stability,
        card.difficulty,
    );
    sqlx::query(
        r#"
        INSERT INTO review_logs (id, user_id, problem_id, rating, review_type,
                                 elapsed_days, stability_before, difficulty_before, reviewed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&log.id)
    .bind(log.user_id)
    .bind(log.problem_id)
    .bind(log.rating)
    .bind(log.review_type)
    .bind(log.elapsed_days)
    .bind(log.stability_before)
    .bind(log.difficulty_before)
    .bind(log.reviewed_at)
    .execute(&state.db)
    .await?;

    let new_reps = card.reps + if payload.rating >= 2 { 1 } else { 0 };
    let new_lapses = card.lapses
        + if card.state == CardState::Review && payload.rating == 1 {
            1
        } else {
            0
        };

    sqlx::query(
        r#"
        INSERT INTO cards (id, user_id, problem_id, state, stability, difficulty,
                           reps, lapses, last_review, due_date, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, problem_id) DO UPDATE SET
            state = excluded.state,
            stability = excluded.stability,
            difficulty = excluded.difficulty,
            reps = excluded.reps,
            lapses = excluded.lapses,
            last_review = excluded.last_review,
            due_date = excluded.due_date,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&card.id)
    .bind(card.user_id)
    .bind(card.problem_id)
    .bind(result.new_state)
    .bind(result.new_stability)
    .bind(result.new_difficulty)
    .bind(new_reps)
    .bind(new_lapses)
    .bind(now)
    .bind(result.next_review)
    .bind(card.created_at)
    .bind(now)
    .execute(&state.db)
    .await?;

    let updated = Card {
        state: result.new_state,
        stability: result.new_stability,
        difficulty: result.new_difficulty,
        reps: new_reps,
        lapses: new_lapses,
        last_review: Some(now),
        due_date: result.next_review,
        updated_at: now,
        ..card
    };
    let intervals = fsrs::calculate_all_intervals(&updated, &params, now)?;

    metrics::counter!("review_submissions_total", "rating" => payload.rating.to_string())
        .increment(1);

    Ok(Json(SubmitReviewResponse {
        success: true,
        message: "review recorded".to_string(),
        next_review_date: result.next_review,
        new_state: result.new_state,
        intervals,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalsQuery {
    user_id: i64,
    problem_id: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalsResponse {
    pub problem_id: i64,
    pub state: CardState,
    /// Predicted recall probability right now.
    pub retrievability: f64,
    /// Days until the next review for Again/Hard/Good/Easy.
    pub intervals: [i64; 4],
}

/// Preview what each rating would schedule, without reviewing.
async fn get_intervals(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IntervalsQuery>,
) -> AppResult<Json<IntervalsResponse>> {
    let card = sqlx::query_as::<_, Card>(
        "SELECT * FROM cards WHERE user_id = ? AND problem_id = ?",
    )
    .bind(query.user_id)
    .bind(query.problem_id)
    .fetch_optional(&state.db)
    .await?
    .unwrap_or_else(|| Card::new(query.user_id, query.problem_id));

    let params = load_user_parameters(
        &state.db,
        query.user_id,
        &state.config.fsrs.default_parameters,
    )
    .await;
    let now = Utc::now();
    let intervals = fsrs::calculate_all_intervals(&card, &params, now)?;

    Ok(Json(IntervalsResponse {
        problem_id: query.problem_id,
        state: card.state,
        retrievability: fsrs::calculate_retrievability(&card, now),
        intervals,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeRequest {
    user_id: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeResponse {
    pub updated: bool,
    pub log_count: usize,
    pub parameters: FsrsParameters,
}

/// Fit the user's FSRS parameters to their review history and persist
/// the result. With fewer than 30 logs this is a no-op by design.
async fn optimize_parameters(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OptimizeRequest>,
) -> AppResult<Json<OptimizeResponse>> {
    let logs = sqlx::query_as::<_, ReviewLog>(
        "SELECT * FROM review_logs WHERE user_id = ? ORDER BY reviewed_at ASC",
    )
    .bind(payload.user_id)
    .fetch_all(&state.db)
    .await?;

    let current = load_user_parameters(
        &state.db,
        payload.user_id,
        &state.config.fsrs.default_parameters,
    )
    .await;
    let fitted = optimizer::optimize_parameters(&logs, &current);
    let updated = fitted != current;

    let weights = serde_json::to_string(&fitted.w.to_vec())?;
    sqlx::query(
        r#"
        INSERT INTO fsrs_params (user_id, weights, request_retention, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            weights = excluded.weights,
            request_retention = excluded.request_retention,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(payload.user_id)
    .bind(&weights)
    .bind(fitted.request_retention)
    .bind(Utc::now())
    .execute(&state.db)
    .await?;

    Ok(Json(OptimizeResponse {
        updated,
        log_count: logs.len(),
        parameters: fitted,
    }))
}
