use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Card, CardState, ReviewRating};

/// FSRS (Free Spaced Repetition Scheduler) engine
///
/// The memory model assigns each card:
/// - Stability (S): days of retention at the request-retention level
/// - Difficulty (D): 1.0 (easiest) to 10.0 (hardest)
/// - Retrievability (R): probability of successful recall right now
///
/// Everything in this module is pure and synchronous; callers pass `now`
/// explicitly so scheduling is deterministic.

pub const MIN_STABILITY: f64 = 0.01;
pub const MAX_STABILITY: f64 = 36500.0;
pub const MIN_DIFFICULTY: f64 = 1.0;
pub const MAX_DIFFICULTY: f64 = 10.0;
pub const MAX_INTERVAL_DAYS: i64 = 36500;

/// Model weights plus the target recall probability for scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsrsParameters {
    pub w: [f64; 17],
    /// Target recall probability, in (0.7, 0.99).
    pub request_retention: f64,
}

impl Default for FsrsParameters {
    fn default() -> Self {
        Self {
            w: [
                0.4,  // w0: initial stability for Again
                0.6,  // w1: initial stability for Hard
                2.4,  // w2: initial stability for Good
                5.8,  // w3: initial stability for Easy
                4.93, // w4: initial difficulty anchor
                0.94, // w5: difficulty step per rating
                0.86, // w6: learning-phase growth base
                0.01, // w7: learning-phase growth offset
                1.49, // w8: review multiplier for Hard
                0.14, // w9: review multiplier for Good
                0.94, // w10: review multiplier for Easy
                2.18, // w11: lapse base
                0.05, // w12: lapse damping
                0.34, // w13: difficulty coupling
                1.26, // w14: retrievability coupling
                0.29, // w15: lapse-count decay
                2.61, // w16: elapsed-time bonus
            ],
            request_retention: 0.9,
        }
    }
}

impl FsrsParameters {
    pub fn from_array(w: [f64; 17], request_retention: f64) -> Self {
        Self {
            w,
            request_retention,
        }
    }

    pub fn to_array(&self) -> [f64; 17] {
        self.w
    }

    /// w0..w3 must be in [0.01, 100], w4..w16 in [-10, 10], everything
    /// finite, and the retention target inside (0.7, 0.99).
    pub fn is_valid(&self) -> bool {
        if !self.request_retention.is_finite()
            || self.request_retention <= 0.7
            || self.request_retention >= 0.99
        {
            return false;
        }
        for (i, w) in self.w.iter().enumerate() {
            if !w.is_finite() {
                return false;
            }
            let ok = if i < 4 {
                (0.01..=100.0).contains(w)
            } else {
                (-10.0..=10.0).contains(w)
            };
            if !ok {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Error)]
pub enum FsrsError {
    #[error("invalid rating: {0} (expected 1..=4)")]
    InvalidRating(i32),

    #[error("invalid card: {0}")]
    InvalidCard(String),

    #[error("FSRS calculation failed: {0}")]
    Calculation(String),
}

/// Outcome of applying one rating to a card.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingResult {
    pub new_state: CardState,
    pub new_difficulty: f64,
    pub new_stability: f64,
    pub next_review: DateTime<Utc>,
    pub interval_days: i64,
    pub elapsed_days: i64,
}

fn clamp_stability(s: f64) -> f64 {
    s.clamp(MIN_STABILITY, MAX_STABILITY)
}

fn clamp_difficulty(d: f64) -> f64 {
    d.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

/// Whole days between the last review and `now`, by calendar date.
/// 0 for never-reviewed cards.
pub fn elapsed_days(card: &Card, now: DateTime<Utc>) -> i64 {
    card.last_review
        .map(|lr| (now.date_naive() - lr.date_naive()).num_days().max(0))
        .unwrap_or(0)
}

/// R = 0.9 ^ (elapsed / stability), clamped to [0, 1]. Cards that were
/// never reviewed are fully retrievable; non-positive stability means
/// the memory is gone.
pub fn calculate_retrievability(card: &Card, now: DateTime<Utc>) -> f64 {
    if card.last_review.is_none() {
        return 1.0;
    }
    if card.stability <= 0.0 {
        return 0.0;
    }
    let elapsed = elapsed_days(card, now) as f64;
    0.9_f64.powf(elapsed / card.stability).clamp(0.0, 1.0)
}

/// interval = stability * ln(target) / ln(0.9), clamped to [1, 36500] days.
pub fn predict_optimal_interval(stability: f64, target_retention: f64) -> f64 {
    let interval = stability * target_retention.ln() / 0.9_f64.ln();
    interval.clamp(1.0, MAX_INTERVAL_DAYS as f64)
}

/// First-rating difficulty. The inner term cancels algebraically but the
/// literal form is kept for parity with the reference implementation.
pub fn calculate_initial_difficulty(rating: ReviewRating, params: &FsrsParameters) -> f64 {
    let w4 = params.w[4];
    let g = rating as i32 as f64;
    let d0 = w4 - w4.exp() * (g - 3.0) / w4.exp();
    clamp_difficulty(d0)
}

/// First-rating stability: w0..w3 selected by rating.
pub fn calculate_initial_stability(rating: ReviewRating, params: &FsrsParameters) -> f64 {
    let s0 = match rating {
        ReviewRating::Again => params.w[0],
        ReviewRating::Hard => params.w[1],
        ReviewRating::Good => params.w[2],
        ReviewRating::Easy => params.w[3],
    };
    clamp_stability(s0)
}

pub(crate) fn next_difficulty(difficulty: f64, rating: ReviewRating, params: &FsrsParameters) -> f64 {
    let g = rating as i32 as f64;
    clamp_difficulty(difficulty - params.w[5] * (g - 3.0))
}

pub(crate) fn next_stability(
    state: CardState,
    stability: f64,
    difficulty: f64,
    lapses: i32,
    elapsed: f64,
    rating: ReviewRating,
    params: &FsrsParameters,
) -> f64 {
    let w = &params.w;
    match state {
        CardState::New => calculate_initial_stability(rating, params),
        CardState::Learning | CardState::Relearning => {
            let k = match rating {
                ReviewRating::Again => w[6],
                ReviewRating::Hard => 1.2 * w[6],
                ReviewRating::Good => 1.5 * w[6],
                ReviewRating::Easy => 2.0 * w[6],
            };
            let mut s_new = stability * (1.0 + k + w[7]);
            if state == CardState::Relearning {
                s_new *= 0.8;
            }
            clamp_stability(s_new)
        }
        CardState::Review => {
            if rating == ReviewRating::Again {
                return clamp_stability(stability * w[11].powi(lapses) * w[12]);
            }
            let r = if stability > 0.0 {
                0.9_f64.powf(elapsed / stability).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let rating_factor = match rating {
                ReviewRating::Hard => w[8],
                ReviewRating::Good => w[9],
                ReviewRating::Easy => w[10],
                ReviewRating::Again => unreachable!(),
            };
            let elapsed_bonus = if elapsed > 0.0 && stability > 0.0 {
                1.0 + w[16] * elapsed / stability
            } else {
                1.0
            };
            let mult = rating_factor
                * ((1.0 - difficulty) * w[13]).exp()
                * ((1.0 - r) * w[14]).exp()
                * w[15].powi(lapses)
                * elapsed_bonus;
            clamp_stability(stability * mult)
        }
    }
}

pub(crate) fn next_state(state: CardState, rating: ReviewRating) -> CardState {
    match (state, rating) {
        (CardState::New, ReviewRating::Again | ReviewRating::Hard) => CardState::New,
        (CardState::New, _) => CardState::Learning,
        (CardState::Learning, ReviewRating::Again) => CardState::New,
        (CardState::Learning, ReviewRating::Hard) => CardState::Learning,
        (CardState::Learning, _) => CardState::Review,
        (CardState::Review, ReviewRating::Again) => CardState::Relearning,
        (CardState::Review, _) => CardState::Review,
        (CardState::Relearning, ReviewRating::Again | ReviewRating::Hard) => CardState::Relearning,
        (CardState::Relearning, _) => CardState::Review,
    }
}

/// Apply one rating to a card and produce its next scheduling state.
pub fn calculate_next_review(
    card: &Card,
    rating: i32,
    params: &FsrsParameters,
    now: DateTime<Utc>,
) -> Result<SchedulingResult, FsrsError> {
    let rating = ReviewRating::from_i32(rating).ok_or(FsrsError::InvalidRating(rating))?;

    if !card.stability.is_finite() || !card.difficulty.is_finite() {
        return Err(FsrsError::InvalidCard(format!(
            "non-finite memory state for card {}",
            card.id
        )));
    }

    let elapsed = elapsed_days(card, now);

    let new_difficulty = if card.state == CardState::New {
        calculate_initial_difficulty(rating, params)
    } else {
        next_difficulty(card.difficulty, rating, params)
    };
    let new_stability = next_stability(
        card.state,
        card.stability,
        card.difficulty,
        card.lapses,
        elapsed as f64,
        rating,
        params,
    );

    if !new_stability.is_finite() || !new_difficulty.is_finite() {
        return Err(FsrsError::Calculation(format!(
            "non-finite result (stability={}, difficulty={})",
            new_stability, new_difficulty
        )));
    }

    let interval_days = (predict_optimal_interval(new_stability, params.request_retention)
        .round() as i64)
        .max(1);

    Ok(SchedulingResult {
        new_state: next_state(card.state, rating),
        new_difficulty,
        new_stability,
        next_review: now + Duration::days(interval_days),
        interval_days,
        elapsed_days: elapsed,
    })
}

/// Preview the interval each of the four ratings would produce.
pub fn calculate_all_intervals(
    card: &Card,
    params: &FsrsParameters,
    now: DateTime<Utc>,
) -> Result<[i64; 4], FsrsError> {
    let mut intervals = [0i64; 4];
    for (i, rating) in ReviewRating::all().iter().enumerate() {
        intervals[i] = calculate_next_review(card, *rating as i32, params, now)?.interval_days;
    }
    Ok(intervals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn card_in(state: CardState, stability: f64, difficulty: f64, reps: i32, lapses: i32) -> Card {
        let mut card = Card::new(1, 100);
        card.state = state;
        card.stability = stability;
        card.difficulty = difficulty;
        card.reps = reps;
        card.lapses = lapses;
        if state != CardState::New {
            card.last_review = Some(Utc::now() - Duration::days(5));
        }
        card
    }

    #[test]
    fn test_new_card_good_initializes_from_weights() {
        let params = FsrsParameters::default();
        let card = card_in(CardState::New, 2.0, 5.0, 0, 0);
        let result = calculate_next_review(&card, 3, &params, Utc::now()).unwrap();

        assert_eq!(result.new_state, CardState::Learning);
        assert!((result.new_stability - 2.4).abs() < 1e-9);
        assert!((1.0..=10.0).contains(&result.new_difficulty));
        assert_eq!(result.interval_days, 2);
        assert_eq!(result.elapsed_days, 0);
    }

    #[test]
    fn test_review_again_is_a_lapse() {
        let params = FsrsParameters::default();
        let mut card = card_in(CardState::Review, 20.0, 5.0, 10, 2);
        card.last_review = Some(Utc::now() - Duration::days(5));
        let result = calculate_next_review(&card, 1, &params, Utc::now()).unwrap();

        let expected = (20.0 * params.w[11].powi(2) * params.w[12])
            .clamp(MIN_STABILITY, MAX_STABILITY);
        assert_eq!(result.new_state, CardState::Relearning);
        assert!((result.new_stability - expected).abs() < 1e-9);
    }

    #[test]
    fn test_state_transition_table() {
        use CardState::*;
        let table = [
            (New, [New, New, Learning, Learning]),
            (Learning, [New, Learning, Review, Review]),
            (Review, [Relearning, Review, Review, Review]),
            (Relearning, [Relearning, Relearning, Review, Review]),
        ];
        for (from, expected) in table {
            for (i, rating) in ReviewRating::all().iter().enumerate() {
                assert_eq!(
                    next_state(from, *rating),
                    expected[i],
                    "from {:?} with {:?}",
                    from,
                    rating
                );
            }
        }
    }

    #[test]
    fn test_bounds_hold_everywhere() {
        let params = FsrsParameters::default();
        let now = Utc::now();
        for state in [
            CardState::New,
            CardState::Learning,
            CardState::Review,
            CardState::Relearning,
        ] {
            for rating in 1..=4 {
                let card = card_in(state, 15.0, 6.5, 4, 1);
                let result = calculate_next_review(&card, rating, &params, now).unwrap();
                assert!((MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&result.new_difficulty));
                assert!((MIN_STABILITY..=MAX_STABILITY).contains(&result.new_stability));
                assert!(result.interval_days >= 1);
                assert!(result.next_review > now);
            }
        }
    }

    #[test]
    fn test_scheduling_is_deterministic() {
        let params = FsrsParameters::default();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut card = card_in(CardState::Review, 12.0, 4.0, 6, 1);
        card.last_review = Some(now - Duration::days(9));

        let a = calculate_next_review(&card, 3, &params, now).unwrap();
        let b = calculate_next_review(&card, 3, &params, now).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_review_rating_ordering() {
        let params = FsrsParameters::default();
        let now = Utc::now();
        let mut card = card_in(CardState::Review, 20.0, 5.0, 8, 0);
        card.last_review = Some(now - Duration::days(10));

        let by_rating: Vec<f64> = (1..=4)
            .map(|r| {
                calculate_next_review(&card, r, &params, now)
                    .unwrap()
                    .new_stability
            })
            .collect();

        assert!(by_rating[3] >= by_rating[2], "easy >= good");
        assert!(by_rating[0] < by_rating[1], "again < hard");
        assert!(by_rating[0] < by_rating[2], "again < good");
        assert!(by_rating[0] < by_rating[3], "again < easy");
    }

    #[test]
    fn test_retrievability_decreases_with_elapsed_time() {
        let now = Utc::now();
        let mut previous = 1.1;
        for days in [0, 1, 5, 10, 30, 90] {
            let mut card = card_in(CardState::Review, 10.0, 5.0, 3, 0);
            card.last_review = Some(now - Duration::days(days));
            let r = calculate_retrievability(&card, now);
            assert!((0.0..=1.0).contains(&r));
            assert!(r < previous, "retrievability must decay ({} days)", days);
            previous = r;
        }
    }

    #[test]
    fn test_retrievability_edge_cases() {
        let now = Utc::now();
        let fresh = card_in(CardState::New, 0.0, 5.0, 0, 0);
        assert_eq!(calculate_retrievability(&fresh, now), 1.0);

        let mut dead = card_in(CardState::Review, 0.0, 5.0, 3, 0);
        dead.last_review = Some(now - Duration::days(3));
        assert_eq!(calculate_retrievability(&dead, now), 0.0);
    }

    #[test]
    fn test_invalid_rating_rejected() {
        let params = FsrsParameters::default();
        let card = card_in(CardState::New, 0.0, 5.0, 0, 0);
        assert!(matches!(
            calculate_next_review(&card, 0, &params, Utc::now()),
            Err(FsrsError::InvalidRating(0))
        ));
        assert!(matches!(
            calculate_next_review(&card, 5, &params, Utc::now()),
            Err(FsrsError::InvalidRating(5))
        ));
    }

    #[test]
    fn test_non_finite_card_rejected() {
        let params = FsrsParameters::default();
        let mut card = card_in(CardState::Review, 10.0, 5.0, 3, 0);
        card.stability = f64::NAN;
        assert!(matches!(
            calculate_next_review(&card, 3, &params, Utc::now()),
            Err(FsrsError::InvalidCard(_))
        ));
    }

    #[test]
    fn test_optimal_interval_clamps() {
        assert_eq!(predict_optimal_interval(0.001, 0.9), 1.0);
        assert_eq!(predict_optimal_interval(1e9, 0.9), MAX_INTERVAL_DAYS as f64);
        // At the 0.9 target the interval equals the stability.
        assert!((predict_optimal_interval(17.0, 0.9) - 17.0).abs() < 1e-9);
    }

    #[test]
    fn test_initial_difficulty_matches_simplified_form() {
        let params = FsrsParameters::default();
        for rating in ReviewRating::all() {
            let g = rating as i32 as f64;
            let simplified = (params.w[4] - (g - 3.0)).clamp(1.0, 10.0);
            let literal = calculate_initial_difficulty(rating, &params);
            assert!((literal - simplified).abs() < 1e-12);
        }
    }

    #[test]
    fn test_all_intervals_preview() {
        let params = FsrsParameters::default();
        let card = card_in(CardState::New, 0.0, 5.0, 0, 0);
        let intervals = calculate_all_intervals(&card, &params, Utc::now()).unwrap();
        // Initial stabilities are w0..w3, so previews are their roundings.
        assert_eq!(intervals, [1, 1, 2, 6]);
        assert!(intervals.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_parameter_array_round_trip() {
        let source = FsrsParameters::default();
        let rebuilt = FsrsParameters::from_array(source.to_array(), source.request_retention);
        assert_eq!(source, rebuilt);
    }

    #[test]
    fn test_parameter_validation() {
        assert!(FsrsParameters::default().is_valid());

        let mut low = FsrsParameters::default();
        low.w[0] = 0.0;
        assert!(!low.is_valid());

        let mut wild = FsrsParameters::default();
        wild.w[10] = 11.0;
        assert!(!wild.is_valid());

        let mut nan = FsrsParameters::default();
        nan.w[5] = f64::NAN;
        assert!(!nan.is_valid());

        let mut retention = FsrsParameters::default();
        retention.request_retention = 0.5;
        assert!(!retention.is_valid());
    }
}
