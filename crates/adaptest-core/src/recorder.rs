//! Builds immutable response events from answer submissions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{AbilityEstimate, Item, ItemId, ResponseEvent};
use crate::normalizer;

/// An answer as submitted by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub item_id: ItemId,
    pub answer: String,
    /// Optional working steps, in the order the learner wrote them.
    #[serde(default)]
    pub steps: Vec<String>,
    /// Remaining time as shown on the client. Display only; never trusted.
    #[serde(default)]
    pub client_remaining_secs: Option<f64>,
}

impl Submission {
    pub fn new(item_id: ItemId, answer: &str) -> Self {
        Self {
            item_id,
            answer: answer.to_string(),
            ..Default::default()
        }
    }
}

/// Grades a submission and stamps it with server-side time.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttemptRecorder;

impl AttemptRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Build the response event for `submission` against `item`.
    ///
    /// `elapsed_seconds` is taken from the session clock, not from the client.
    pub fn record(
        &self,
        session: &AbilityEstimate,
        item: &Item,
        submission: &Submission,
        now: DateTime<Utc>,
    ) -> ResponseEvent {
        let given_answer = submission.answer.trim().to_string();
        let evaluation = normalizer::evaluate(&given_answer, &item.canonical_answer);

        let event = ResponseEvent {
            id: Uuid::new_v4(),
            learner_id: session.learner_id,
            item_id: item.id,
            given_answer,
            is_correct: evaluation.is_correct,
            score: evaluation.score,
            elapsed_seconds: session.elapsed_seconds(now),
            timestamp: now,
            steps: submission.steps.clone(),
        };

        tracing::debug!(
            learner_id = event.learner_id,
            item_id = event.item_id,
            is_correct = event.is_correct,
            elapsed_secs = event.elapsed_seconds,
            "response recorded"
        );
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn grades_and_stamps_server_time() {
        let start = Utc::now();
        let session = AbilityEstimate::new(5, start, 3540);
        let item = Item::new(11, "Expand (x+1)^2", "x^2 + 2x + 1", 0.3);
        let mut submission = Submission::new(11, "  X**2+2X+1 ");
        submission.steps = vec!["(x+1)(x+1)".into(), "x^2+x+x+1".into()];
        submission.client_remaining_secs = Some(9999.0);

        let now = start + Duration::seconds(42);
        let event = AttemptRecorder::new().record(&session, &item, &submission, now);

        assert_eq!(event.learner_id, 5);
        assert_eq!(event.item_id, 11);
        assert_eq!(event.given_answer, "X**2+2X+1");
        assert!(event.is_correct);
        assert_eq!(event.score, 1.0);
        assert!((event.elapsed_seconds - 42.0).abs() < 1e-9);
        assert_eq!(event.timestamp, now);
        assert_eq!(event.steps.len(), 2);
    }

    #[test]
    fn wrong_answer_scores_zero() {
        let now = Utc::now();
        let session = AbilityEstimate::new(1, now, 3540);
        let item = Item::new(2, "Solve 2x = 4", "x=2", -1.0);
        let submission = Submission::new(2, "x = 4");
        let event = AttemptRecorder::new().record(&session, &item, &submission, now);
        assert!(!event.is_correct);
        assert_eq!(event.score, 0.0);
    }

    #[test]
    fn each_event_gets_a_fresh_id() {
        let now = Utc::now();
        let session = AbilityEstimate::new(1, now, 3540);
        let item = Item::new(2, "Solve 2x = 4", "x=2", -1.0);
        let recorder = AttemptRecorder::new();
        let a = recorder.record(&session, &item, &Submission::new(2, "x=2"), now);
        let b = recorder.record(&session, &item, &Submission::new(2, "x=2"), now);
        assert_ne!(a.id, b.id);
    }
}
