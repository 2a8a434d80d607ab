use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum ProblemDifficulty {
    Easy,
    Medium,
    Hard,
}

impl ProblemDifficulty {
    /// Lenient parse for request query strings; unknown values are dropped
    /// by the caller rather than rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "EASY" => Some(ProblemDifficulty::Easy),
            "MEDIUM" => Some(ProblemDifficulty::Medium),
            "HARD" => Some(ProblemDifficulty::Hard),
            _ => None,
        }
    }

    /// Ordinal used by the similarity distance term.
    pub fn rank(&self) -> i32 {
        match self {
            ProblemDifficulty::Easy => 0,
            ProblemDifficulty::Medium => 1,
            ProblemDifficulty::Hard => 2,
        }
    }
}

impl std::fmt::Display for ProblemDifficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProblemDifficulty::Easy => "EASY",
            ProblemDifficulty::Medium => "MEDIUM",
            ProblemDifficulty::Hard => "HARD",
        };
        write!(f, "{}", s)
    }
}

/// An algorithm problem. Immutable to the scheduling core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: i64,
    pub title: String,
    pub difficulty: ProblemDifficulty,
    pub tags: Vec<String>,
    pub categories: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

/// Raw row; `tags` and `categories` are JSON-encoded TEXT columns.
#[derive(Debug, FromRow)]
pub struct ProblemRow {
    pub id: i64,
    pub title: String,
    pub difficulty: ProblemDifficulty,
    pub tags: String,
    pub categories: String,
    pub created_at: DateTime<Utc>,
}

impl ProblemRow {
    pub fn into_problem(self) -> Problem {
        Problem {
            id: self.id,
            title: self.title,
            difficulty: self.difficulty,
            tags: serde_json::from_str(&self.tags).unwrap_or_default(),
            categories: serde_json::from_str(&self.categories).unwrap_or_default(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProblem {
    pub title: String,
    pub difficulty: ProblemDifficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub categories: Vec<i64>,
}
