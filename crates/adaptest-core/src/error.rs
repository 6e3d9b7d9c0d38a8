//! Error types for the assessment core.
//!
//! Estimation failures never leave the estimator; they are mapped to sentinel
//! values there. The errors below are the ones a caller of the engine can see,
//! plus the contextualizer error that the engine classifies for retries.

use thiserror::Error;

use crate::model::{ItemId, LearnerId};

/// Errors returned by [`AssessmentEngine`](crate::engine::AssessmentEngine) operations.
#[derive(Debug, Error)]
pub enum AssessmentError {
    /// The submitted item does not exist in the catalog.
    #[error("unknown item: {0}")]
    UnknownItem(ItemId),

    /// The learner already answered this item in the active session.
    #[error("item {0} was already answered in this session")]
    ItemAlreadyAnswered(ItemId),

    /// Only students can take an adaptive session.
    #[error("learner {0} is not a student")]
    NotAStudent(LearnerId),

    /// Another writer committed against the same session in between.
    #[error("concurrent modification of session for learner {0}")]
    Conflict(LearnerId),

    /// The persistence collaborator failed.
    #[error(transparent)]
    Store(StoreError),
}

impl AssessmentError {
    /// Returns `true` for client-input validation failures.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AssessmentError::UnknownItem(_)
                | AssessmentError::ItemAlreadyAnswered(_)
                | AssessmentError::NotAStudent(_)
        )
    }
}

impl From<StoreError> for AssessmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { learner_id, .. } => AssessmentError::Conflict(learner_id),
            other => AssessmentError::Store(other),
        }
    }
}

/// Errors raised by an [`AssessmentStore`](crate::store::AssessmentStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored session version does not match the one the writer read.
    #[error("version conflict for learner {learner_id}: expected {expected}, found {found}")]
    Conflict {
        learner_id: LearnerId,
        expected: u64,
        found: u64,
    },

    /// The backing storage is unavailable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Reasons the maximum-likelihood fit can fail.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimationError {
    /// A difficulty in the history was NaN or infinite.
    #[error("non-finite difficulty in response history")]
    NonFiniteInput,

    /// The optimizer did not reach the tolerance in the allowed iterations.
    #[error("optimizer did not converge after {iterations} iterations")]
    NonConvergence { iterations: u32 },
}

/// Errors that can occur when contextualizing an item.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The model answered, but not with a usable JSON object.
    #[error("malformed context payload: {0}")]
    MalformedPayload(String),

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ContextError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ContextError::AuthenticationFailed(_))
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ContextError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflict_maps_to_assessment_conflict() {
        let err: AssessmentError = StoreError::Conflict {
            learner_id: 7,
            expected: 2,
            found: 3,
        }
        .into();
        assert!(matches!(err, AssessmentError::Conflict(7)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn validation_errors_are_client_errors() {
        assert!(AssessmentError::UnknownItem(1).is_client_error());
        assert!(AssessmentError::ItemAlreadyAnswered(1).is_client_error());
        assert!(AssessmentError::NotAStudent(1).is_client_error());
        assert!(!AssessmentError::Store(StoreError::Unavailable("down".into())).is_client_error());
    }

    #[test]
    fn context_error_classification() {
        assert!(ContextError::AuthenticationFailed("bad key".into()).is_permanent());
        assert!(!ContextError::Timeout(30).is_permanent());
        assert_eq!(
            ContextError::RateLimited {
                retry_after_ms: 2000
            }
            .retry_after_ms(),
            Some(2000)
        );
        assert_eq!(ContextError::NetworkError("reset".into()).retry_after_ms(), None);
    }
}
