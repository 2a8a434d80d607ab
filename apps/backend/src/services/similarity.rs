use serde::Serialize;
use sqlx::SqlitePool;

use crate::config::SimilarityConfig;
use crate::error::{AppResult, OptionExt};
use crate::models::{Problem, ProblemRow};

/// Weighted feature similarity between problems over tags, categories
/// and difficulty. Used by the related-problems endpoint.

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarProblem {
    pub problem: Problem,
    pub score: f64,
}

fn jaccard<T: PartialEq>(a: &[T], b: &[T]) -> Option<f64> {
    if a.is_empty() && b.is_empty() {
        return None;
    }
    let intersection = a.iter().filter(|&item| b.contains(item)).count();
    let union = a.len() + b.len() - intersection;
    Some(intersection as f64 / union as f64)
}

/// Similarity in [0, 1]. Feature sets that are empty on both sides fall
/// back to the configured neutral value instead of claiming a match.
pub fn similarity(config: &SimilarityConfig, a: &Problem, b: &Problem) -> f64 {
    let tag_sim = jaccard(&a.tags, &b.tags).unwrap_or(config.empty_feature_similarity);
    let category_sim =
        jaccard(&a.categories, &b.categories).unwrap_or(config.empty_feature_similarity);
    let difficulty_sim =
        1.0 - (a.difficulty.rank() - b.difficulty.rank()).abs() as f64 / 2.0;

    let weight_sum = config.tag_weight + config.category_weight + config.difficulty_weight;
    if weight_sum <= 0.0 {
        return 0.0;
    }
    (config.tag_weight * tag_sim
        + config.category_weight * category_sim
        + config.difficulty_weight * difficulty_sim)
        / weight_sum
}

/// The `limit` most similar problems to `problem_id`, best first.
pub async fn similar_problems(
    db: &SqlitePool,
    config: &SimilarityConfig,
    problem_id: i64,
    limit: usize,
) -> AppResult<Vec<SimilarProblem>> {
    let limit = limit.clamp(1, 50);

    let target = sqlx::query_as::<_, ProblemRow>("SELECT * FROM problems WHERE id = ?")
        .bind(problem_id)
        .fetch_optional(db)
        .await?
        .ok_or_not_found("Problem", problem_id.to_string())?
        .into_problem();

    let rows = sqlx::query_as::<_, ProblemRow>("SELECT * FROM problems WHERE id != ?")
        .bind(problem_id)
        .fetch_all(db)
        .await?;

    let mut scored: Vec<SimilarProblem> = rows
        .into_iter()
        .map(|row| {
            let problem = row.into_problem();
            let score = similarity(config, &target, &problem);
            SimilarProblem { problem, score }
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(limit);
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProblemDifficulty;
    use chrono::Utc;

    fn config() -> SimilarityConfig {
        SimilarityConfig {
            tag_weight: 0.5,
            category_weight: 0.3,
            difficulty_weight: 0.2,
            empty_feature_similarity: 0.1,
        }
    }

    fn problem(id: i64, difficulty: ProblemDifficulty, tags: &[&str], categories: &[i64]) -> Problem {
        Problem {
            id,
            title: format!("Problem {}", id),
            difficulty,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            categories: categories.to_vec(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_identical_feature_sets_score_one() {
        let a = problem(1, ProblemDifficulty::Medium, &["graph", "bfs"], &[3]);
        let b = problem(2, ProblemDifficulty::Medium, &["graph", "bfs"], &[3]);
        assert!((similarity(&config(), &a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_tags_score_lower() {
        let base = problem(1, ProblemDifficulty::Medium, &["graph"], &[]);
        let close = problem(2, ProblemDifficulty::Medium, &["graph"], &[]);
        let far = problem(3, ProblemDifficulty::Medium, &["dynamic-programming"], &[]);

        let cfg = config();
        assert!(similarity(&cfg, &base, &close) > similarity(&cfg, &base, &far));
    }

    #[test]
    fn test_empty_features_use_neutral_value() {
        let a = problem(1, ProblemDifficulty::Easy, &[], &[]);
        let b = problem(2, ProblemDifficulty::Easy, &[], &[]);
        let cfg = config();
        // tag and category terms both collapse to the neutral value.
        let expected = (0.5 * 0.1 + 0.3 * 0.1 + 0.2 * 1.0) / 1.0;
        assert!((similarity(&cfg, &a, &b) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_difficulty_distance_penalized() {
        let cfg = config();
        let easy = problem(1, ProblemDifficulty::Easy, &["graph"], &[]);
        let medium = problem(2, ProblemDifficulty::Medium, &["graph"], &[]);
        let hard = problem(3, ProblemDifficulty::Hard, &["graph"], &[]);

        assert!(similarity(&cfg, &easy, &medium) > similarity(&cfg, &easy, &hard));
    }

    #[tokio::test]
    async fn test_similar_problems_orders_best_first() {
        let pool = crate::db::test_pool().await;
        for (id, tags) in [
            (1, r#"["graph", "bfs"]"#),
            (2, r#"["graph", "bfs"]"#),
            (3, r#"["math"]"#),
        ] {
            sqlx::query(
                "INSERT INTO problems (id, title, difficulty, tags, categories, created_at)
                 VALUES (?, ?, 'MEDIUM', ?, '[]', ?)",
            )
            .bind(id)
            .bind(format!("P{}", id))
            .bind(tags)
            .bind(Utc::now())
            .execute(&pool)
            .await
            .unwrap();
        }

        let similar = similar_problems(&pool, &config(), 1, 10).await.unwrap();
        assert_eq!(similar.len(), 2);
        assert_eq!(similar[0].problem.id, 2);
        assert!(similar[0].score > similar[1].score);
    }
}
