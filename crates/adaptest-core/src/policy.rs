//! Stopping rules and time accounting for an adaptive session.
//!
//! A session is ACTIVE until one of the stopping conditions fires, then
//! FINALIZED for good. Conditions are checked in a fixed priority order:
//! precision, item cap, time budget. Item exhaustion is detected by the
//! engine when the selector comes back empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{AbilityEstimate, FinalizeReason, ItemId, LearnerId, DEFAULT_TIME_BUDGET_SECS};

/// Tunable session policy parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Finalize once the standard error drops below this.
    pub precision_threshold: f64,
    /// Finalize once this many responses are recorded.
    pub max_items: usize,
    /// Session length in seconds, measured from the session start.
    pub time_budget_secs: u64,
    /// Client/server remaining-time differences above this are logged.
    pub clock_skew_tolerance_secs: f64,
    /// How long a served item stays reserved for the learner.
    pub reservation_ttl_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            precision_threshold: 0.4,
            max_items: 30,
            time_budget_secs: DEFAULT_TIME_BUDGET_SECS,
            clock_skew_tolerance_secs: 5.0,
            reservation_ttl_secs: 600,
        }
    }
}

/// Applies [`PolicyConfig`] to session records.
#[derive(Debug, Clone, Default)]
pub struct SessionPolicy {
    config: PolicyConfig,
}

impl SessionPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Start a new active session.
    pub fn open_session(&self, learner_id: LearnerId, now: DateTime<Utc>) -> AbilityEstimate {
        tracing::info!(learner_id, budget_secs = self.config.time_budget_secs, "session opened");
        AbilityEstimate::new(learner_id, now, self.config.time_budget_secs)
    }

    /// Whether the server-side clock says the budget is spent.
    pub fn is_expired(&self, estimate: &AbilityEstimate, now: DateTime<Utc>) -> bool {
        estimate.elapsed_seconds(now) >= estimate.time_budget_seconds as f64
    }

    /// Evaluate the stopping conditions after a re-estimation.
    pub fn evaluate(
        &self,
        estimate: &AbilityEstimate,
        response_count: usize,
        now: DateTime<Utc>,
    ) -> Option<FinalizeReason> {
        if estimate.standard_error < self.config.precision_threshold {
            Some(FinalizeReason::PrecisionReached)
        } else if response_count >= self.config.max_items {
            Some(FinalizeReason::ItemCapReached)
        } else if self.is_expired(estimate, now) {
            Some(FinalizeReason::TimeExpired)
        } else {
            None
        }
    }

    /// Transition a session to FINALIZED and log the transition.
    pub fn finalize(
        &self,
        estimate: &mut AbilityEstimate,
        reason: FinalizeReason,
        now: DateTime<Utc>,
    ) {
        estimate.finalize(reason, now);
        tracing::info!(
            learner_id = estimate.learner_id,
            theta = estimate.theta,
            standard_error = estimate.standard_error,
            elapsed_secs = estimate.elapsed_seconds(now),
            "session finalized: {reason}"
        );
    }

    /// Compare a client-reported remaining time with the server value.
    ///
    /// Returns the signed discrepancy (client minus server) when it exceeds the
    /// tolerance. The client value is informational only.
    pub fn check_client_time(
        &self,
        estimate: &AbilityEstimate,
        client_remaining_secs: f64,
        now: DateTime<Utc>,
    ) -> Option<f64> {
        let server_remaining =
            (estimate.time_budget_seconds as f64 - estimate.elapsed_seconds(now)).max(0.0);
        let discrepancy = client_remaining_secs - server_remaining;
        if discrepancy.abs() > self.config.clock_skew_tolerance_secs {
            tracing::warn!(
                learner_id = estimate.learner_id,
                client_remaining_secs,
                server_remaining_secs = server_remaining,
                discrepancy,
                "client-reported remaining time disagrees with server"
            );
            Some(discrepancy)
        } else {
            None
        }
    }

    /// The reserved item, if the reservation has not yet lapsed.
    pub fn live_reservation(
        &self,
        estimate: &AbilityEstimate,
        now: DateTime<Utc>,
    ) -> Option<ItemId> {
        let item_id = estimate.reserved_item_id?;
        let reserved_at = estimate.reserved_at?;
        let age = (now - reserved_at).num_seconds();
        if age < self.config.reservation_ttl_secs as i64 {
            Some(item_id)
        } else {
            None
        }
    }
}
