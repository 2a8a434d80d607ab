use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use crate::error::AppResult;
use crate::models::{CardState, ProblemDifficulty};

/// Per-user review queue split into the four scheduling cohorts. The
/// new cohort mixes NEW-state cards with problems the user has never
/// touched, since cards only exist after a first review.

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub problem_id: i64,
    pub title: String,
    pub difficulty: ProblemDifficulty,
    pub state: CardState,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewQueue {
    pub new_cards: Vec<QueueEntry>,
    pub learning_cards: Vec<QueueEntry>,
    pub review_cards: Vec<QueueEntry>,
    pub relearning_cards: Vec<QueueEntry>,
    pub total_count: usize,
}

pub async fn build_queue(db: &SqlitePool, user_id: i64, limit: usize) -> AppResult<ReviewQueue> {
    let limit = limit.clamp(1, 50);
    let now = Utc::now();

    let carded = sqlx::query_as::<_, QueueEntry>(
        r#"
        SELECT c.problem_id, p.title, p.difficulty, c.state, c.due_date
        FROM cards c
        JOIN problems p ON p.id = c.problem_id
        WHERE c.user_id = ?
          AND (c.state IN ('NEW', 'LEARNING', 'RELEARNING') OR c.due_date <= ?)
        ORDER BY c.due_date ASC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(now)
    .bind((limit * 4) as i64)
    .fetch_all(db)
    .await?;

    let mut queue = ReviewQueue {
        new_cards: Vec::new(),
        learning_cards: Vec::new(),
        review_cards: Vec::new(),
        relearning_cards: Vec::new(),
        total_count: 0,
    };

    for entry in carded {
        let cohort = match entry.state {
            CardState::New => &mut queue.new_cards,
            CardState::Learning => &mut queue.learning_cards,
            CardState::Review => &mut queue.review_cards,
            CardState::Relearning => &mut queue.relearning_cards,
        };
        if cohort.len() < limit {
            cohort.push(entry);
        }
    }

    // Top up the new cohort with never-attempted problems.
    if queue.new_cards.len() < limit {
        let remaining = (limit - queue.new_cards.len()) as i64;
        let untouched = sqlx::query_as::<_, UntouchedRow>(
            r#"
            SELECT p.id, p.title, p.difficulty
            FROM problems p
            LEFT JOIN cards c ON c.problem_id = p.id AND c.user_id = ?
            WHERE c.id IS NULL
            ORDER BY p.id ASC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(remaining)
        .fetch_all(db)
        .await?;

        for row in untouched {
            queue.new_cards.push(QueueEntry {
                problem_id: row.id,
                title: row.title,
                difficulty: row.difficulty,
                state: CardState::New,
                due_date: now,
            });
        }
    }

    queue.total_count = queue.new_cards.len()
        + queue.learning_cards.len()
        + queue.review_cards.len()
        + queue.relearning_cards.len();
    Ok(queue)
}

#[derive(Debug, FromRow)]
struct UntouchedRow {
    id: i64,
    title: String,
    difficulty: ProblemDifficulty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::Duration;

    async fn seed_problem(pool: &SqlitePool, id: i64, title: &str) {
        sqlx::query(
            "INSERT INTO problems (id, title, difficulty, tags, categories, created_at)
             VALUES (?, ?, 'EASY', '[]', '[]', ?)",
        )
        .bind(id)
        .bind(title)
        .bind(Utc::now())
        .execute(pool)
        .await
        .unwrap();
    }

    async fn seed_card(pool: &SqlitePool, user_id: i64, problem_id: i64, state: &str, due_in: i64) {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO cards (id, user_id, problem_id, state, stability, difficulty,
                                reps, lapses, last_review, due_date, created_at, updated_at)
             VALUES (?, ?, ?, ?, 3.0, 5.0, 1, 0, ?, ?, ?, ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(problem_id)
        .bind(state)
        .bind(now - Duration::days(2))
        .bind(now + Duration::days(due_in))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_cohorts_partition_by_state() {
        let pool = db::test_pool().await;
        for (id, title) in [(1, "A"), (2, "B"), (3, "C"), (4, "D"), (5, "E")] {
            seed_problem(&pool, id, title).await;
        }
        seed_card(&pool, 7, 1, "LEARNING", 1).await;
        seed_card(&pool, 7, 2, "REVIEW", -1).await;
        seed_card(&pool, 7, 3, "RELEARNING", 0).await;
        seed_card(&pool, 7, 4, "REVIEW", 30).await; // not due

        let queue = build_queue(&pool, 7, 10).await.unwrap();
        assert_eq!(queue.learning_cards.len(), 1);
        assert_eq!(queue.review_cards.len(), 1);
        assert_eq!(queue.relearning_cards.len(), 1);
        // Problem 5 has no card yet, so it fills the new cohort.
        assert!(queue.new_cards.iter().any(|e| e.problem_id == 5));
        assert_eq!(
            queue.total_count,
            queue.new_cards.len() + 3
        );
    }

    #[tokio::test]
    async fn test_fresh_user_sees_only_new_problems() {
        let pool = db::test_pool().await;
        seed_problem(&pool, 1, "A").await;
        seed_problem(&pool, 2, "B").await;

        let queue = build_queue(&pool, 42, 10).await.unwrap();
        assert_eq!(queue.new_cards.len(), 2);
        assert!(queue.review_cards.is_empty());
        assert_eq!(queue.total_count, 2);
    }
}
