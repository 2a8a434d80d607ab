use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// FSRS memory state of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum CardState {
    New,
    Learning,
    Review,
    Relearning,
}

impl std::fmt::Display for CardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CardState::New => "NEW",
            CardState::Learning => "LEARNING",
            CardState::Review => "REVIEW",
            CardState::Relearning => "RELEARNING",
        };
        write!(f, "{}", s)
    }
}

/// User self-assessment on the 4-point scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewRating {
    Again = 1, // Failed to recall
    Hard = 2,  // Struggled but recalled
    Good = 3,  // Correct with effort
    Easy = 4,  // Effortless recall
}

impl ReviewRating {
    /// Parse a wire-level rating. Anything outside 1..=4 is rejected.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(ReviewRating::Again),
            2 => Some(ReviewRating::Hard),
            3 => Some(ReviewRating::Good),
            4 => Some(ReviewRating::Easy),
            _ => None,
        }
    }

    pub fn all() -> [ReviewRating; 4] {
        [
            ReviewRating::Again,
            ReviewRating::Hard,
            ReviewRating::Good,
            ReviewRating::Easy,
        ]
    }
}

/// One scheduling record per (user, problem). Created lazily on first
/// review and mutated only through the FSRS engine.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub user_id: i64,
    pub problem_id: i64,
    pub state: CardState,
    /// Days until recall probability drops to the request retention.
    pub stability: f64,
    /// 1.0 (easiest) to 10.0 (hardest).
    pub difficulty: f64,
    /// Successful review count.
    pub reps: i32,
    /// Times rated Again from the REVIEW state.
    pub lapses: i32,
    pub last_review: Option<DateTime<Utc>>,
    pub due_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    pub fn new(user_id: i64, problem_id: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            problem_id,
            state: CardState::New,
            stability: 0.0,
            difficulty: 5.0,
            reps: 0,
            lapses: 0,
            last_review: None,
            due_date: now,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_parse_bounds() {
        assert_eq!(ReviewRating::from_i32(1), Some(ReviewRating::Again));
        assert_eq!(ReviewRating::from_i32(4), Some(ReviewRating::Easy));
        assert_eq!(ReviewRating::from_i32(0), None);
        assert_eq!(ReviewRating::from_i32(5), None);
    }

    #[test]
    fn test_new_card_invariants() {
        let card = Card::new(7, 42);
        assert_eq!(card.state, CardState::New);
        assert_eq!(card.reps, 0);
        assert!(card.last_review.is_none());
    }
}
