use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use crate::config::ProfilingConfig;
use crate::models::{CardState, ProblemCandidate, ProblemDifficulty, ProblemRow};

/// Candidate assembly: turn a user's card state into ranked-ready
/// candidates with urgency signals. Any failure on the primary path
/// degrades to a recent-problems fallback so recommendations never
/// error out on storage trouble.

const MIN_LIMIT: usize = 1;
const MAX_LIMIT: usize = 50;

#[derive(Debug, FromRow)]
struct CandidateRow {
    problem_id: i64,
    state: CardState,
    stability: f64,
    difficulty: f64,
    reps: i32,
    lapses: i32,
    last_review: Option<DateTime<Utc>>,
    due_date: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct EnrichRow {
    id: i64,
    title: String,
    difficulty: ProblemDifficulty,
    tags: String,
}

/// Heuristic accuracy from the card's memory signals, in [0, 1].
fn recent_accuracy(stability: f64, difficulty: f64, reps: i32, lapses: i32) -> f64 {
    let acc = 0.3 + (stability / 30.0).min(1.0) * 0.7 - (difficulty / 10.0).min(0.5)
        + (reps as f64 * 0.02).min(0.2)
        - (lapses as f64 * 0.1).min(0.4);
    acc.clamp(0.0, 1.0)
}

fn retention_probability(stability: f64, last_review: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(last_review) = last_review else {
        return 1.0;
    };
    if stability <= 0.0 {
        return 0.0;
    }
    let elapsed = (now.date_naive() - last_review.date_naive()).num_days().max(0) as f64;
    (-elapsed / stability).exp().clamp(0.0, 1.0)
}

fn urgency_score(retention: f64, days_overdue: i64) -> f64 {
    let overdue_boost = (((days_overdue + 1) as f64).ln() / 10.0).min(0.3);
    ((1.0 - retention) + overdue_boost).clamp(0.0, 1.0)
}

/// Build up to `limit` candidates for a user, least-practiced and
/// weakest first. Falls back to the most recent problems with neutral
/// priors for cold starts.
pub async fn build_candidates(
    db: &SqlitePool,
    profiling: &ProfilingConfig,
    user_id: i64,
    limit: usize,
    recent_fallback_limit: i64,
) -> Vec<ProblemCandidate> {
    let limit = limit.clamp(MIN_LIMIT, MAX_LIMIT);

    let mut candidates = match card_candidates(db, user_id, limit).await {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::warn!("Candidate query failed for user {}: {}", user_id, e);
            Vec::new()
        }
    };

    if candidates.is_empty() {
        let cap = (limit as i64).min(recent_fallback_limit).max(1);
        return match recent_problem_candidates(db, profiling, cap).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!("Recent-problem fallback failed: {}", e);
                Vec::new()
            }
        };
    }

    if let Err(e) = enrich_with_problems(db, profiling, &mut candidates).await {
        tracing::warn!("Tag enrichment failed, leaving candidates bare: {}", e);
    }
    candidates
}

/// Practice domain for a tag list: the mapped domain of the first tag,
/// falling back to the raw tag.
fn topic_for_tags(profiling: &ProfilingConfig, tags: &[String]) -> String {
    tags.first()
        .map(|tag| {
            profiling
                .domain_for_tag(tag)
                .unwrap_or(tag.as_str())
                .to_string()
        })
        .unwrap_or_else(|| "general".to_string())
}

async fn card_candidates(
    db: &SqlitePool,
    user_id: i64,
    limit: usize,
) -> Result<Vec<ProblemCandidate>, sqlx::Error> {
    let now = Utc::now();
    let rows = sqlx::query_as::<_, CandidateRow>(
        r#"
        SELECT problem_id, state, stability, difficulty, reps, lapses, last_review, due_date
        FROM cards
        WHERE user_id = ?
          AND (state IN ('NEW', 'LEARNING', 'RELEARNING') OR due_date <= ?)
        ORDER BY due_date ASC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(now)
    .bind(limit as i64)
    .fetch_all(db)
    .await?;

    let mut candidates: Vec<ProblemCandidate> = rows
        .into_iter()
        .map(|row| {
            let retention = retention_probability(row.stability, row.last_review, now);
            let days_overdue = (now.date_naive() - row.due_date.date_naive())
                .num_days()
                .max(0);
            ProblemCandidate {
                problem_id: row.problem_id,
                title: String::new(),
                topic: "general".to_string(),
                difficulty: ProblemDifficulty::Medium,
                tags: Vec::new(),
                attempts: row.reps,
                recent_accuracy: recent_accuracy(
                    row.stability,
                    row.difficulty,
                    row.reps,
                    row.lapses,
                ),
                retention_probability: retention,
                days_overdue,
                urgency_score: urgency_score(retention, days_overdue),
            }
        })
        .collect();

    // Least practiced first, weakest accuracy breaking ties.
    candidates.sort_by(|a, b| {
        a.attempts
            .cmp(&b.attempts)
            .then(a.recent_accuracy.total_cmp(&b.recent_accuracy))
    });
    Ok(candidates)
}

/// Single batched lookup of titles, difficulties and tags.
async fn enrich_with_problems(
    db: &SqlitePool,
    profiling: &ProfilingConfig,
    candidates: &mut [ProblemCandidate],
) -> Result<(), sqlx::Error> {
    if candidates.is_empty() {
        return Ok(());
    }

    let placeholders = vec!["?"; candidates.len()].join(", ");
    let sql = format!(
        "SELECT id, title, difficulty, tags FROM problems WHERE id IN ({})",
        placeholders
    );
    let mut query = sqlx::query_as::<_, EnrichRow>(&sql);
    for candidate in candidates.iter() {
        query = query.bind(candidate.problem_id);
    }
    let rows = query.fetch_all(db).await?;

    for candidate in candidates.iter_mut() {
        if let Some(row) = rows.iter().find(|row| row.id == candidate.problem_id) {
            candidate.title = row.title.clone();
            candidate.difficulty = row.difficulty;
            candidate.tags = serde_json::from_str(&row.tags).unwrap_or_default();
            candidate.topic = topic_for_tags(profiling, &candidate.tags);
        }
    }
    Ok(())
}

/// Cold-start fallback: the most recent problems with neutral priors.
async fn recent_problem_candidates(
    db: &SqlitePool,
    profiling: &ProfilingConfig,
    limit: i64,
) -> Result<Vec<ProblemCandidate>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ProblemRow>(
        "SELECT * FROM problems ORDER BY created_at DESC, id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let problem = row.into_problem();
            ProblemCandidate {
                problem_id: problem.id,
                title: problem.title,
                topic: topic_for_tags(profiling, &problem.tags),
                difficulty: problem.difficulty,
                tags: problem.tags,
                attempts: 0,
                recent_accuracy: 0.5,
                retention_probability: 0.5,
                days_overdue: 0,
                urgency_score: 0.5,
            }
        })
        .collect())
}
