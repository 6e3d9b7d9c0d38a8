//! Core data model types for adaptest.
//!
//! Items form the read-only catalog, response events are the append-only
//! answer log, and the ability estimate is the per-learner session record that
//! the engine mutates after every answer until it is finalized.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a catalog item.
pub type ItemId = u64;

/// Identifier of a learner.
pub type LearnerId = u64;

/// Lower bound of the ability and difficulty scale.
pub const THETA_MIN: f64 = -3.0;
/// Upper bound of the ability and difficulty scale.
pub const THETA_MAX: f64 = 3.0;

/// Default session time budget (59 minutes).
pub const DEFAULT_TIME_BUDGET_SECS: u64 = 3540;

/// A catalog entry (exercise) with its Rasch difficulty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique item identifier.
    pub id: ItemId,
    /// Text shown to the learner.
    pub statement: String,
    /// The expected answer, compared after normalization.
    pub canonical_answer: String,
    /// Difficulty parameter `b`, on the same scale as theta.
    pub difficulty: f64,
    /// Slope parameter `a`. Stored for future 2PL use; the 1PL estimator ignores it.
    #[serde(default = "default_discrimination")]
    pub discrimination: f64,
    /// Topic labels (e.g. "funciones", "matrices").
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_discrimination() -> f64 {
    1.0
}

impl Item {
    /// Convenience constructor with default discrimination and no tags.
    pub fn new(id: ItemId, statement: &str, canonical_answer: &str, difficulty: f64) -> Self {
        Self {
            id,
            statement: statement.to_string(),
            canonical_answer: canonical_answer.to_string(),
            difficulty,
            discrimination: default_discrimination(),
            tags: Vec::new(),
        }
    }
}

/// One learner-item interaction. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEvent {
    pub id: Uuid,
    pub learner_id: LearnerId,
    pub item_id: ItemId,
    /// The raw answer as typed by the learner.
    pub given_answer: String,
    pub is_correct: bool,
    /// 1.0 when correct, 0.0 otherwise.
    pub score: f64,
    /// Server-side seconds elapsed in the session when the answer arrived.
    pub elapsed_seconds: f64,
    pub timestamp: DateTime<Utc>,
    /// Working steps submitted alongside the answer, in order.
    #[serde(default)]
    pub steps: Vec<String>,
}

/// Why a session was finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeReason {
    PrecisionReached,
    ItemCapReached,
    TimeExpired,
    NoItemsAvailable,
}

impl fmt::Display for FinalizeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalizeReason::PrecisionReached => write!(f, "precision reached"),
            FinalizeReason::ItemCapReached => write!(f, "item cap reached"),
            FinalizeReason::TimeExpired => write!(f, "time expired"),
            FinalizeReason::NoItemsAvailable => write!(f, "no items available"),
        }
    }
}

/// Per-learner session state: the current ability estimate and its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityEstimate {
    pub learner_id: LearnerId,
    /// Ability estimate, always within `[THETA_MIN, THETA_MAX]`.
    pub theta: f64,
    pub standard_error: f64,
    pub session_start_time: DateTime<Utc>,
    pub time_budget_seconds: u64,
    pub is_finalized: bool,
    pub finalize_reason: Option<FinalizeReason>,
    pub finalized_at: Option<DateTime<Utc>>,
    /// Item currently served and awaiting an answer.
    pub reserved_item_id: Option<ItemId>,
    pub reserved_at: Option<DateTime<Utc>>,
    /// Incremented on every commit; used to detect lost updates.
    pub version: u64,
}

impl AbilityEstimate {
    /// A fresh, active session with neutral defaults.
    pub fn new(learner_id: LearnerId, now: DateTime<Utc>, time_budget_seconds: u64) -> Self {
        Self {
            learner_id,
            theta: 0.0,
            standard_error: 1.0,
            session_start_time: now,
            time_budget_seconds,
            is_finalized: false,
            finalize_reason: None,
            finalized_at: None,
            reserved_item_id: None,
            reserved_at: None,
            version: 0,
        }
    }

    /// Seconds elapsed since the session started, never negative.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> f64 {
        let millis = (now - self.session_start_time).num_milliseconds();
        (millis.max(0) as f64) / 1000.0
    }

    /// Seconds left in the budget, floored at zero.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u64 {
        let remaining = self.time_budget_seconds as f64 - self.elapsed_seconds(now);
        remaining.max(0.0).floor() as u64
    }

    /// Mark the session terminal. The reservation is cleared.
    pub fn finalize(&mut self, reason: FinalizeReason, now: DateTime<Utc>) {
        self.is_finalized = true;
        self.finalize_reason = Some(reason);
        self.finalized_at = Some(now);
        self.clear_reservation();
    }

    pub fn reserve(&mut self, item_id: ItemId, now: DateTime<Utc>) {
        self.reserved_item_id = Some(item_id);
        self.reserved_at = Some(now);
    }

    pub fn clear_reservation(&mut self) {
        self.reserved_item_id = None;
        self.reserved_at = None;
    }
}

/// The role a user holds, resolved once when a session is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearnerRole {
    Student,
    Teacher,
    #[default]
    Unset,
}

impl fmt::Display for LearnerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LearnerRole::Student => write!(f, "student"),
            LearnerRole::Teacher => write!(f, "teacher"),
            LearnerRole::Unset => write!(f, "unset"),
        }
    }
}

impl FromStr for LearnerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" | "estudiante" => Ok(LearnerRole::Student),
            "teacher" | "docente" => Ok(LearnerRole::Teacher),
            "unset" | "" => Ok(LearnerRole::Unset),
            other => Err(format!("unknown learner role: {other}")),
        }
    }
}

/// A user entering an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Learner {
    pub id: LearnerId,
    pub role: LearnerRole,
}

impl Learner {
    pub fn student(id: LearnerId) -> Self {
        Self {
            id,
            role: LearnerRole::Student,
        }
    }
}

/// A single (difficulty, correctness) pair fed to the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub difficulty: f64,
    pub is_correct: bool,
}

impl Observation {
    pub fn new(difficulty: f64, is_correct: bool) -> Self {
        Self {
            difficulty,
            is_correct,
        }
    }
}

/// Exposure counters for one item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStats {
    pub times_served: u64,
    pub times_answered: u64,
    pub times_correct: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn finalize_reason_display() {
        assert_eq!(FinalizeReason::PrecisionReached.to_string(), "precision reached");
        assert_eq!(FinalizeReason::ItemCapReached.to_string(), "item cap reached");
        assert_eq!(FinalizeReason::TimeExpired.to_string(), "time expired");
        assert_eq!(FinalizeReason::NoItemsAvailable.to_string(), "no items available");
    }

    #[test]
    fn learner_role_parse() {
        assert_eq!("Student".parse::<LearnerRole>().unwrap(), LearnerRole::Student);
        assert_eq!("docente".parse::<LearnerRole>().unwrap(), LearnerRole::Teacher);
        assert_eq!("".parse::<LearnerRole>().unwrap(), LearnerRole::Unset);
        assert!("admin".parse::<LearnerRole>().is_err());
    }

    #[test]
    fn new_estimate_is_neutral() {
        let now = Utc::now();
        let est = AbilityEstimate::new(1, now, DEFAULT_TIME_BUDGET_SECS);
        assert_eq!(est.theta, 0.0);
        assert_eq!(est.standard_error, 1.0);
        assert!(!est.is_finalized);
        assert_eq!(est.remaining_seconds(now), DEFAULT_TIME_BUDGET_SECS);
    }

    #[test]
    fn remaining_seconds_floors_at_zero() {
        let start = Utc::now();
        let est = AbilityEstimate::new(1, start, 60);
        assert_eq!(est.remaining_seconds(start + Duration::seconds(15)), 45);
        assert_eq!(est.remaining_seconds(start + Duration::seconds(600)), 0);
        // A clock that goes backwards never yields more than the budget.
        assert_eq!(est.remaining_seconds(start - Duration::seconds(5)), 60);
    }

    #[test]
    fn finalize_clears_reservation() {
        let now = Utc::now();
        let mut est = AbilityEstimate::new(1, now, 60);
        est.reserve(42, now);
        est.finalize(FinalizeReason::TimeExpired, now);
        assert!(est.is_finalized);
        assert_eq!(est.finalize_reason, Some(FinalizeReason::TimeExpired));
        assert!(est.reserved_item_id.is_none());
        assert!(est.reserved_at.is_none());
    }

    #[test]
    fn item_discrimination_defaults_to_one() {
        let item: Item = serde_json::from_str(
            r#"{"id": 3, "statement": "2x = 4", "canonical_answer": "x=2", "difficulty": -0.5}"#,
        )
        .unwrap();
        assert_eq!(item.discrimination, 1.0);
        assert!(item.tags.is_empty());
    }
}
