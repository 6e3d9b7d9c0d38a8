//! Maximum-likelihood ability estimation under the Rasch model.
//!
//! The estimator always returns a usable `(theta, standard_error)` pair.
//! Optimizer failures are logged and replaced by sentinel values; callers
//! never see an error from [`AbilityEstimator::estimate`].

use serde::{Deserialize, Serialize};

use crate::error::EstimationError;
use crate::model::{Observation, THETA_MAX, THETA_MIN};
use crate::rasch::{nll_gradient, test_information};

/// Information at or below this is treated as zero.
const DEGENERATE_INFORMATION: f64 = 1e-8;

/// Tunable thresholds for the estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Below this total information the estimate is reset to neutral.
    pub min_information: f64,
    /// Lower clamp for the standard error.
    pub se_min: f64,
    /// Upper clamp for the standard error.
    pub se_max: f64,
    /// Standard error reported when information is below `min_information`.
    pub low_information_se: f64,
    /// Standard error reported with no history, degenerate information, or optimizer failure.
    pub fallback_se: f64,
    /// Optimizer iteration cap.
    pub max_iterations: u32,
    /// Optimizer convergence tolerance on both gradient and step.
    pub tolerance: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            min_information: 0.1,
            se_min: 0.2,
            se_max: 2.0,
            low_information_se: 1.5,
            fallback_se: 1.0,
            max_iterations: 200,
            tolerance: 1e-8,
        }
    }
}

/// Which branch of the estimation procedure produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateQuality {
    /// Empty history; neutral defaults.
    NoHistory,
    /// Optimizer converged and information was sufficient.
    Converged,
    /// Information below the configured floor; theta reset to neutral.
    LowInformation,
    /// Information numerically zero; fallback standard error.
    DegenerateInformation,
    /// The optimizer failed; neutral fallback.
    Fallback,
}

/// An ability estimate with its standard error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThetaEstimate {
    pub theta: f64,
    pub standard_error: f64,
    pub quality: EstimateQuality,
}

/// Fits theta and its standard error from a response history.
#[derive(Debug, Clone, Default)]
pub struct AbilityEstimator {
    config: EstimatorConfig,
}

impl AbilityEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Estimate ability and standard error for `history`.
    pub fn estimate(&self, history: &[Observation]) -> ThetaEstimate {
        if history.is_empty() {
            return ThetaEstimate {
                theta: 0.0,
                standard_error: self.config.fallback_se,
                quality: EstimateQuality::NoHistory,
            };
        }

        let theta = match self.maximum_likelihood(history) {
            Ok(theta) => theta.clamp(THETA_MIN, THETA_MAX),
            Err(e) => {
                tracing::warn!(
                    n_items = history.len(),
                    "ability estimation failed, using neutral fallback: {e}"
                );
                return ThetaEstimate {
                    theta: 0.0,
                    standard_error: self.config.fallback_se,
                    quality: EstimateQuality::Fallback,
                };
            }
        };

        let information = test_information(theta, history);

        if information < self.config.min_information {
            tracing::warn!(
                n_items = history.len(),
                theta,
                information,
                "insufficient information, resetting theta to neutral"
            );
            return ThetaEstimate {
                theta: 0.0,
                standard_error: self.config.low_information_se,
                quality: EstimateQuality::LowInformation,
            };
        }

        if !information.is_finite() || information <= DEGENERATE_INFORMATION {
            tracing::warn!(
                n_items = history.len(),
                information,
                "total information is numerically zero"
            );
            return ThetaEstimate {
                theta,
                standard_error: self.config.fallback_se,
                quality: EstimateQuality::DegenerateInformation,
            };
        }

        let standard_error =
            (1.0 / information.sqrt()).clamp(self.config.se_min, self.config.se_max);
        ThetaEstimate {
            theta,
            standard_error,
            quality: EstimateQuality::Converged,
        }
    }

    /// Minimize the negative log-likelihood over `[THETA_MIN, THETA_MAX]`.
    ///
    /// The gradient of the negative log-likelihood is non-decreasing in theta,
    /// so the minimizer is either a bound or the unique root of the gradient.
    /// The root is found with Newton steps from `theta = 0`, falling back to
    /// bisection whenever a step leaves the current bracket.
    pub fn maximum_likelihood(&self, history: &[Observation]) -> Result<f64, EstimationError> {
        if history.iter().any(|obs| !obs.difficulty.is_finite()) {
            return Err(EstimationError::NonFiniteInput);
        }
        if history.is_empty() {
            return Ok(0.0);
        }

        let tol = self.config.tolerance;
        if nll_gradient(THETA_MIN, history) > 0.0 {
            return Ok(THETA_MIN);
        }
        if nll_gradient(THETA_MAX, history) < 0.0 {
            return Ok(THETA_MAX);
        }

        let (mut lo, mut hi) = (THETA_MIN, THETA_MAX);
        let mut theta = 0.0;

        for _ in 0..self.config.max_iterations {
            let gradient = nll_gradient(theta, history);
            if gradient.abs() < tol {
                return Ok(theta);
            }
            if gradient > 0.0 {
                hi = theta;
            } else {
                lo = theta;
            }

            let curvature = test_information(theta, history);
            let mut next = theta - gradient / curvature;
            if !next.is_finite() || next <= lo || next >= hi {
                next = 0.5 * (lo + hi);
            }

            if (next - theta).abs() < tol {
                return Ok(next);
            }
            theta = next;
        }

        Err(EstimationError::NonConvergence {
            iterations: self.config.max_iterations,
        })
    }
}
