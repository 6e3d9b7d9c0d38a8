//! Simulation report types with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{FinalizeReason, LearnerId};

/// Final state of one simulated learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerResult {
    pub learner_id: LearnerId,
    /// Ability used to generate the responses.
    pub true_theta: f64,
    pub estimated_theta: f64,
    pub standard_error: f64,
    pub items_answered: usize,
    pub items_correct: usize,
    pub reason: Option<FinalizeReason>,
}

/// Aggregate over every learner sharing one true ability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThetaSummary {
    pub true_theta: f64,
    pub learners: usize,
    pub mean_estimate: f64,
    /// Bias of the estimate (mean estimate minus true theta).
    pub bias: f64,
    pub rmse: f64,
    pub mean_standard_error: f64,
    pub mean_items: f64,
    pub precision_reached: usize,
}

/// A complete simulation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Number of items in the simulated catalog.
    pub catalog_size: usize,
    pub seed: u64,
    pub results: Vec<LearnerResult>,
    pub summary: Vec<ThetaSummary>,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl SimulationReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: SimulationReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }
}

/// Group results by true theta, in ascending order.
pub fn summarize(results: &[LearnerResult]) -> Vec<ThetaSummary> {
    let mut thetas: Vec<f64> = results.iter().map(|r| r.true_theta).collect();
    thetas.sort_by(f64::total_cmp);
    thetas.dedup();

    thetas
        .into_iter()
        .map(|true_theta| {
            let group: Vec<&LearnerResult> = results
                .iter()
                .filter(|r| r.true_theta == true_theta)
                .collect();
            let mean_estimate = mean(&group, |r| r.estimated_theta);
            ThetaSummary {
                true_theta,
                learners: group.len(),
                mean_estimate,
                bias: mean_estimate - true_theta,
                rmse: mean(&group, |r| (r.estimated_theta - r.true_theta).powi(2)).sqrt(),
                mean_standard_error: mean(&group, |r| r.standard_error),
                mean_items: mean(&group, |r| r.items_answered as f64),
                precision_reached: group
                    .iter()
                    .filter(|r| r.reason == Some(FinalizeReason::PrecisionReached))
                    .count(),
            }
        })
        .collect()
}

fn mean(group: &[&LearnerResult], f: impl Fn(&LearnerResult) -> f64) -> f64 {
    group.iter().map(|&r| f(r)).sum::<f64>() / group.len() as f64
}
