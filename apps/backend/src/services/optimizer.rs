use std::collections::BTreeMap;

use crate::models::{CardState, ReviewLog, ReviewRating};

use super::fsrs::{self, FsrsParameters};

/// Parameter fitting over a user's review history.
///
/// Numeric gradient descent on the mean squared error between predicted
/// retrievability and observed success (rating >= 3). The pre-review
/// stability for each log is obtained by replaying the problem's log
/// sequence through the engine formulas under the candidate weights, so
/// the loss actually depends on them.

const MIN_LOGS: usize = 30;
const EPSILON: f64 = 1e-6;
const LEARNING_RATE: f64 = 0.01;
const MAX_ITERATIONS: usize = 100;
const GRADIENT_TOLERANCE: f64 = 1e-6;

/// Fit parameters to the given history. Returns `current` unchanged when
/// the history is too small (< 30 logs) or anything about the
/// optimization fails.
pub fn optimize_parameters(logs: &[ReviewLog], current: &FsrsParameters) -> FsrsParameters {
    if logs.len() < MIN_LOGS {
        tracing::debug!(
            logs = logs.len(),
            "not enough review history to optimize, keeping current parameters"
        );
        return current.clone();
    }

    let sequences = group_by_problem(logs);
    let mut params = current.clone();

    for _ in 0..MAX_ITERATIONS {
        let mut gradient = [0.0f64; 17];
        let mut norm_sq = 0.0f64;

        for k in 0..17 {
            let mut plus = params.clone();
            plus.w[k] += EPSILON;
            let mut minus = params.clone();
            minus.w[k] -= EPSILON;

            let (loss_plus, loss_minus) = match (loss(&sequences, &plus), loss(&sequences, &minus))
            {
                (Some(a), Some(b)) => (a, b),
                _ => return current.clone(),
            };
            gradient[k] = (loss_plus - loss_minus) / (2.0 * EPSILON);
            norm_sq += gradient[k] * gradient[k];
        }

        if !norm_sq.is_finite() {
            return current.clone();
        }
        if norm_sq.sqrt() < GRADIENT_TOLERANCE {
            break;
        }

        for k in 0..17 {
            params.w[k] -= LEARNING_RATE * gradient[k];
        }
        clamp_weights(&mut params);
    }

    if params.is_valid() {
        params
    } else {
        current.clone()
    }
}

fn clamp_weights(params: &mut FsrsParameters) {
    for (i, w) in params.w.iter_mut().enumerate() {
        *w = if i < 4 {
            w.clamp(0.01, 100.0)
        } else {
            w.clamp(-10.0, 10.0)
        };
    }
}

/// Per-problem log sequences in review order.
fn group_by_problem(logs: &[ReviewLog]) -> Vec<Vec<&ReviewLog>> {
    let mut grouped: BTreeMap<i64, Vec<&ReviewLog>> = BTreeMap::new();
    for log in logs {
        grouped.entry(log.problem_id).or_default().push(log);
    }
    grouped
        .into_values()
        .map(|mut seq| {
            seq.sort_by_key(|log| log.reviewed_at);
            seq
        })
        .collect()
}

/// Mean squared error of predicted recall vs observed success over all
/// non-first reviews. `None` when the replay produces non-finite values
/// or there is nothing to predict.
fn loss(sequences: &[Vec<&ReviewLog>], params: &FsrsParameters) -> Option<f64> {
    let mut total = 0.0f64;
    let mut count = 0usize;

    for sequence in sequences {
        let mut state = CardState::New;
        let mut stability = 0.0f64;
        let mut difficulty = 5.0f64;
        let mut lapses = 0i32;

        for log in sequence {
            let rating = ReviewRating::from_i32(log.rating)?;
            let elapsed = log.elapsed_days.max(0) as f64;

            if state != CardState::New && stability > 0.0 {
                let predicted = 0.9_f64.powf(elapsed / stability).clamp(0.0, 1.0);
                let observed = if log.rating >= 3 { 1.0 } else { 0.0 };
                let error = predicted - observed;
                total += error * error;
                count += 1;
            }

            let new_difficulty = if state == CardState::New {
                fsrs::calculate_initial_difficulty(rating, params)
            } else {
                fsrs::next_difficulty(difficulty, rating, params)
            };
            stability = fsrs::next_stability(
                state, stability, difficulty, lapses, elapsed, rating, params,
            );
            difficulty = new_difficulty;
            if state == CardState::Review && rating == ReviewRating::Again {
                lapses += 1;
            }
            state = fsrs::next_state(state, rating);

            if !stability.is_finite() || !difficulty.is_finite() {
                return None;
            }
        }
    }

    if count == 0 {
        return None;
    }
    let mse = total / count as f64;
    mse.is_finite().then_some(mse)
}
