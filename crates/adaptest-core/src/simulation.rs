//! Simulated learners for calibrating policy parameters.
//!
//! Each simulated learner has a fixed true ability and answers each served
//! item correctly with the Rasch probability for that ability. Sessions run
//! through a shared [`AssessmentEngine`], so the full cycle (grading,
//! estimation, stopping rules, selection) is exercised exactly as in
//! production.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::engine::{AssessmentEngine, EngineConfig};
use crate::model::{Item, ItemId, Learner, LearnerId};
use crate::rasch::probability;
use crate::recorder::Submission;
use crate::report::{summarize, LearnerResult, SimulationReport};
use crate::store::MemoryStore;
use crate::traits::PassthroughContextualizer;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// True abilities to simulate.
    pub true_thetas: Vec<f64>,
    /// Learners simulated per true ability.
    pub learners_per_theta: usize,
    /// Maximum concurrent sessions.
    pub parallelism: usize,
    /// Seed for response generation. Item tie-breaking is not seeded.
    pub seed: u64,
    pub engine: EngineConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            true_thetas: vec![-1.5, 0.0, 1.5],
            learners_per_theta: 10,
            parallelism: 4,
            seed: 42,
            engine: EngineConfig::default(),
        }
    }
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_learner_complete(&self, result: &LearnerResult);
    fn on_learner_error(&self, learner_id: LearnerId, error: &str);
    fn on_simulation_complete(&self, total: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_learner_complete(&self, _: &LearnerResult) {}
    fn on_learner_error(&self, _: LearnerId, _: &str) {}
    fn on_simulation_complete(&self, _: usize, _: usize, _: Duration) {}
}

/// Run every simulated learner to finalization against `items`.
pub async fn run_simulation(
    items: Vec<Item>,
    config: &SimulationConfig,
    progress: &dyn ProgressReporter,
) -> Result<SimulationReport> {
    if items.is_empty() {
        anyhow::bail!("cannot simulate against an empty item catalog");
    }

    let start = Instant::now();
    let catalog_size = items.len();
    let answers: Arc<HashMap<ItemId, String>> = Arc::new(
        items
            .iter()
            .map(|item| (item.id, item.canonical_answer.clone()))
            .collect(),
    );
    let engine = Arc::new(AssessmentEngine::new(
        Arc::new(MemoryStore::new(items)),
        Arc::new(PassthroughContextualizer),
        config.engine.clone(),
    ));
    let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));

    let mut futures = FuturesUnordered::new();
    let mut learner_id: LearnerId = 0;
    for &true_theta in &config.true_thetas {
        for _ in 0..config.learners_per_theta {
            learner_id += 1;
            let engine = Arc::clone(&engine);
            let answers = Arc::clone(&answers);
            let semaphore = Arc::clone(&semaphore);
            let seed = config.seed.wrapping_add(learner_id);

            futures.push(async move {
                let inner = async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                    simulate_learner(&engine, &answers, learner_id, true_theta, seed).await
                };
                (learner_id, inner.await)
            });
        }
    }

    let total = futures.len();
    let mut results = Vec::with_capacity(total);
    let mut failed = 0usize;
    while let Some((learner_id, result)) = futures.next().await {
        match result {
            Ok(result) => {
                progress.on_learner_complete(&result);
                results.push(result);
            }
            Err(e) => {
                tracing::error!(learner_id, "simulated session failed: {e:#}");
                progress.on_learner_error(learner_id, &e.to_string());
                failed += 1;
            }
        }
    }
    results.sort_by_key(|r| r.learner_id);

    let elapsed = start.elapsed();
    progress.on_simulation_complete(total, failed, elapsed);
    tracing::info!(
        learners = total,
        failed,
        elapsed_ms = elapsed.as_millis() as u64,
        "simulation complete"
    );

    Ok(SimulationReport {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        catalog_size,
        seed: config.seed,
        summary: summarize(&results),
        results,
        duration_ms: elapsed.as_millis() as u64,
    })
}

async fn simulate_learner(
    engine: &AssessmentEngine,
    answers: &HashMap<ItemId, String>,
    learner_id: LearnerId,
    true_theta: f64,
    seed: u64,
) -> Result<LearnerResult> {
    let mut rng = StdRng::seed_from_u64(seed);
    let learner = Learner::student(learner_id);
    let mut items_correct = 0usize;

    let mut outcome = engine.next_item(&learner).await?;
    while let Some(item) = outcome.next_item.take() {
        let canonical = answers
            .get(&item.id)
            .ok_or_else(|| anyhow::anyhow!("served item {} has no answer key", item.id))?;
        let answer = if rng.gen_bool(probability(true_theta, item.difficulty)) {
            items_correct += 1;
            canonical.clone()
        } else {
            format!("not {canonical}")
        };
        outcome = engine
            .submit_answer(&learner, Submission::new(item.id, &answer))
            .await?;
    }

    Ok(LearnerResult {
        learner_id,
        true_theta,
        estimated_theta: outcome.theta,
        standard_error: outcome.standard_error,
        items_answered: outcome.items_answered,
        items_correct,
        reason: outcome.reason,
    })
}
