//! Rasch (1PL) response model primitives shared by estimation and selection.

use crate::model::Observation;

/// Logit arguments are clamped to this magnitude before exponentiation.
const LOGIT_CLAMP: f64 = 50.0;

/// Probabilities are kept this far from 0 and 1 inside logarithms.
const PROB_FLOOR: f64 = 1e-12;

/// Numerically stable logistic function.
pub fn sigmoid(z: f64) -> f64 {
    let z = z.clamp(-LOGIT_CLAMP, LOGIT_CLAMP);
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Probability of a correct response at ability `theta` to an item of difficulty `b`.
pub fn probability(theta: f64, difficulty: f64) -> f64 {
    sigmoid(theta - difficulty)
}

/// Fisher information of a single item: `P(1 - P)`.
pub fn item_information(theta: f64, difficulty: f64) -> f64 {
    let p = probability(theta, difficulty);
    p * (1.0 - p)
}

/// Total Fisher information of a response history at `theta`.
pub fn test_information(theta: f64, history: &[Observation]) -> f64 {
    history
        .iter()
        .map(|obs| item_information(theta, obs.difficulty))
        .sum()
}

/// Negative log-likelihood of a history at `theta`.
pub fn negative_log_likelihood(theta: f64, history: &[Observation]) -> f64 {
    -history
        .iter()
        .map(|obs| {
            let p = probability(theta, obs.difficulty).clamp(PROB_FLOOR, 1.0 - PROB_FLOOR);
            if obs.is_correct {
                p.ln()
            } else {
                (1.0 - p).ln()
            }
        })
        .sum::<f64>()
}

/// First derivative of the negative log-likelihood: `-Σ (y - P)`.
///
/// Monotonically non-decreasing in `theta`, since its derivative is the
/// test information.
pub fn nll_gradient(theta: f64, history: &[Observation]) -> f64 {
    -history
        .iter()
        .map(|obs| {
            let y = if obs.is_correct { 1.0 } else { 0.0 };
            y - probability(theta, obs.difficulty)
        })
        .sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_midpoint_and_symmetry() {
        assert!((sigmoid(0.0) - 0.5).abs() < f64::EPSILON);
        for z in [0.3, 1.0, 4.5, 20.0] {
            assert!((sigmoid(z) + sigmoid(-z) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn sigmoid_extreme_arguments_stay_finite() {
        for z in [1e6, -1e6, f64::MAX, f64::MIN] {
            let p = sigmoid(z);
            assert!(p.is_finite());
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn information_peaks_at_matching_difficulty() {
        let at_match = item_information(0.7, 0.7);
        assert!((at_match - 0.25).abs() < 1e-12);
        assert!(item_information(0.7, 2.0) < at_match);
        assert!(item_information(0.7, -1.0) < at_match);
    }

    #[test]
    fn nll_is_finite_at_extremes() {
        let history = vec![Observation::new(-3.0, false), Observation::new(3.0, true)];
        assert!(negative_log_likelihood(3.0, &history).is_finite());
        assert!(negative_log_likelihood(-3.0, &history).is_finite());
    }

    #[test]
    fn gradient_sign_matches_direction_of_improvement() {
        let all_correct = vec![Observation::new(0.0, true); 3];
        // More ability always helps an all-correct history.
        assert!(nll_gradient(0.0, &all_correct) < 0.0);
        let all_wrong = vec![Observation::new(0.0, false); 3];
        assert!(nll_gradient(0.0, &all_wrong) > 0.0);
    }
}
