use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppResult, OptionExt};
use crate::models::{
    CreateProblem, FeedbackResponse, Problem, ProblemDifficulty, ProblemRow, RecommendRequest,
    RecommendationResponse, SubmitFeedback,
};
use crate::services::similarity::{self, SimilarProblem};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_problems).post(create_problem))
        .route("/ai-recommendations", get(ai_recommendations))
        .route("/:id", get(get_problem))
        .route("/:id/similar", get(similar_problems))
        .route("/:id/recommendation-feedback", post(submit_feedback))
}

async fn list_problems(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Problem>>> {
    let rows = sqlx::query_as::<_, ProblemRow>("SELECT * FROM problems ORDER BY id ASC")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(rows.into_iter().map(ProblemRow::into_problem).collect()))
}

async fn get_problem(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<Problem>> {
    let row = sqlx::query_as::<_, ProblemRow>("SELECT * FROM problems WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_not_found("Problem", id.to_string())?;
    Ok(Json(row.into_problem()))
}

/// Seed/admin path; problems are immutable to the scheduling core once
/// created.
async fn create_problem(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateProblem>,
) -> AppResult<(StatusCode, Json<Problem>)> {
    let now = Utc::now();
    let tags = serde_json::to_string(&payload.tags)?;
    let categories = serde_json::to_string(&payload.categories)?;

    let result = sqlx::query(
        "INSERT INTO problems (title, difficulty, tags, categories, created_at)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&payload.title)
    .bind(payload.difficulty)
    .bind(&tags)
    .bind(&categories)
    .bind(now)
    .execute(&state.db)
    .await?;

    let problem = Problem {
        id: result.last_insert_rowid(),
        title: payload.title,
        difficulty: payload.difficulty,
        tags: payload.tags,
        categories: payload.categories,
        created_at: now,
    };
    Ok((StatusCode::CREATED, Json(problem)))
}

#[derive(Deserialize)]
pub struct SimilarQuery {
    limit: Option<usize>,
}

async fn similar_problems(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<SimilarQuery>,
) -> AppResult<Json<Vec<SimilarProblem>>> {
    let similar = similarity::similar_problems(
        &state.db,
        &state.config.similarity,
        id,
        query.limit.unwrap_or(10),
    )
    .await?;
    Ok(Json(similar))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationsQuery {
    user_id: i64,
    limit: Option<usize>,
    objective: Option<String>,
    /// Comma-separated practice domains.
    domains: Option<String>,
    difficulty: Option<String>,
    timebox: Option<u32>,
}

async fn ai_recommendations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecommendationsQuery>,
) -> AppResult<(HeaderMap, Json<RecommendationResponse>)> {
    let request = RecommendRequest {
        user_id: query.user_id,
        limit: query.limit.unwrap_or(10),
        objective: query.objective,
        target_domains: query
            .domains
            .map(|raw| {
                raw.split(',')
                    .map(|domain| domain.trim().to_string())
                    .filter(|domain| !domain.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
        difficulty_preference: query.difficulty.as_deref().and_then(ProblemDifficulty::parse),
        timebox_minutes: query.timebox,
    };

    let response = state.recommender.recommend(&state.db, request).await;

    let mut headers = HeaderMap::new();
    insert_header(&mut headers, "x-trace-id", &response.meta.trace_id);
    insert_header(
        &mut headers,
        "x-cache-hit",
        if response.meta.cached { "true" } else { "false" },
    );
    insert_header(
        &mut headers,
        "x-rec-source",
        response.meta.strategy.source_header(),
    );
    insert_header(
        &mut headers,
        "x-provider-chain",
        &response.meta.chain_hops.join(">"),
    );
    if let Some(reason) = &response.meta.fallback_reason {
        insert_header(&mut headers, "x-fallback-reason", reason);
    }

    Ok((headers, Json(response)))
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(name, value);
    }
}

async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<SubmitFeedback>,
) -> AppResult<Json<FeedbackResponse>> {
    let problem: Option<i64> = sqlx::query_scalar("SELECT id FROM problems WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?;
    problem.ok_or_not_found("Problem", id.to_string())?;

    let recorded_at = Utc::now();
    sqlx::query(
        "INSERT INTO recommendation_feedback (id, user_id, problem_id, feedback, note, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(payload.user_id)
    .bind(id)
    .bind(payload.feedback.as_str())
    .bind(&payload.note)
    .bind(recorded_at)
    .execute(&state.db)
    .await?;

    metrics::counter!("recommendation_feedback_total", "feedback" => payload.feedback.as_str())
        .increment(1);

    Ok(Json(FeedbackResponse {
        status: "ok",
        recorded_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChainNodeConfig, Config};
    use crate::db;
    use crate::models::{FeedbackKind, Strategy};
    use crate::routes::review::CardLocks;
    use crate::services::recommendation::RecommendationService;

    async fn test_state(configure: impl FnOnce(&mut Config)) -> Arc<AppState> {
        let pool = db::test_pool().await;
        let mut config = Config::from_env();
        config.llm.nodes = vec![ChainNodeConfig {
            name: "mock".to_string(),
            enabled: true,
            timeout_ms: 1_000,
            retry_attempts: 1,
            on_errors_to_next: vec![],
        }];
        configure(&mut config);
        let recommender = RecommendationService::new(&config);
        Arc::new(AppState {
            db: pool,
            config,
            recommender,
            locks: CardLocks::new(),
        })
    }

    async fn seed_problem(state: &AppState, id: i64, tags: &str) {
        sqlx::query(
            "INSERT INTO problems (id, title, difficulty, tags, categories, created_at)
             VALUES (?, ?, 'MEDIUM', ?, '[]', ?)",
        )
        .bind(id)
        .bind(format!("Problem {}", id))
        .bind(tags)
        .bind(Utc::now())
        .execute(&state.db)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let state = test_state(|_| {}).await;
        let (status, created) = create_problem(
            State(state.clone()),
            Json(CreateProblem {
                title: "Two Sum".to_string(),
                difficulty: ProblemDifficulty::Easy,
                tags: vec!["array".to_string()],
                categories: vec![1],
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let fetched = get_problem(State(state.clone()), Path(created.0.id))
            .await
            .unwrap();
        assert_eq!(fetched.0.title, "Two Sum");
        assert_eq!(fetched.0.tags, vec!["array".to_string()]);
    }

    #[tokio::test]
    async fn test_recommendations_cold_start_headers() {
        let state = test_state(|config| {
            config.llm.enabled = false;
        })
        .await;
        seed_problem(&state, 1, r#"["graph"]"#).await;

        let (headers, response) = ai_recommendations(
            State(state.clone()),
            Query(RecommendationsQuery {
                user_id: 7,
                limit: Some(5),
                objective: None,
                domains: Some("graphs, basket-weaving".to_string()),
                difficulty: Some("medium".to_string()),
                timebox: Some(30),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.0.meta.strategy, Strategy::FsrsFallback);
        assert_eq!(headers.get("x-rec-source").unwrap(), "FSRS");
        assert_eq!(headers.get("x-cache-hit").unwrap(), "false");
        assert_eq!(headers.get("x-fallback-reason").unwrap(), "llm_disabled");
        assert!(headers.get("x-trace-id").is_some());
    }

    #[tokio::test]
    async fn test_feedback_recorded_append_only() {
        let state = test_state(|_| {}).await;
        seed_problem(&state, 1, "[]").await;

        let response = submit_feedback(
            State(state.clone()),
            Path(1),
            Json(SubmitFeedback {
                user_id: 7,
                feedback: FeedbackKind::Helpful,
                note: Some("good pick".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(response.0.status, "ok");

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM recommendation_feedback WHERE problem_id = 1")
                .fetch_one(&state.db)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }

    /// `/ai-recommendations` and `/:id` share the segment position under
    /// `/problems`; pin down that the static route wins over the capture
    /// when both are served from the same mounted router.
    #[tokio::test]
    async fn test_static_route_not_shadowed_by_id_capture() {
        let state = test_state(|config| {
            config.llm.enabled = false;
        })
        .await;
        seed_problem(&state, 1, r#"["graph"]"#).await;

        let app = axum::Router::new()
            .nest("/problems", router())
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = reqwest::Client::new();

        let by_id = client
            .get(format!("http://{}/problems/1", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(by_id.status(), 200);
        let problem: serde_json::Value = by_id.json().await.unwrap();
        assert_eq!(problem["id"], 1);
        assert_eq!(problem["title"], "Problem 1");

        // Must reach the recommendations handler, not fail parsing
        // "ai-recommendations" as an id.
        let recs = client
            .get(format!(
                "http://{}/problems/ai-recommendations?userId=7&limit=5",
                addr
            ))
            .send()
            .await
            .unwrap();
        assert_eq!(recs.status(), 200);
        assert_eq!(recs.headers().get("x-rec-source").unwrap(), "FSRS");
        let body: serde_json::Value = recs.json().await.unwrap();
        assert_eq!(body["meta"]["strategy"], "fsrs_fallback");

        let missing = client
            .get(format!("http://{}/problems/999", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);
    }

    #[tokio::test]
    async fn test_similar_endpoint_excludes_self() {
        let state = test_state(|_| {}).await;
        seed_problem(&state, 1, r#"["graph"]"#).await;
        seed_problem(&state, 2, r#"["graph"]"#).await;

        let similar = similar_problems(
            State(state.clone()),
            Path(1),
            Query(SimilarQuery { limit: Some(5) }),
        )
        .await
        .unwrap();
        assert_eq!(similar.0.len(), 1);
        assert_eq!(similar.0[0].problem.id, 2);
    }
}
