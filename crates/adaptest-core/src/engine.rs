//! Adaptive session orchestrator.
//!
//! Runs the per-request cycle (validate, record, re-estimate, check stopping
//! rules, select, commit, contextualize) for one learner at a time.
//! Submissions for the same learner are serialized by a per-learner lock;
//! different learners never contend.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{AssessmentError, ContextError};
use crate::estimator::{AbilityEstimator, EstimatorConfig};
use crate::model::{
    AbilityEstimate, FinalizeReason, Item, ItemId, Learner, LearnerId, LearnerRole, Observation,
    ResponseEvent,
};
use crate::normalizer::Evaluation;
use crate::policy::{PolicyConfig, SessionPolicy};
use crate::recorder::{AttemptRecorder, Submission};
use crate::selector::ItemSelector;
use crate::store::{AssessmentStore, ResetSummary, SessionCommit};
use crate::traits::{Clock, Contextualizer, ItemContext, SystemClock};

/// Upper bound on the delay between contextualization retries.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Idle per-learner locks are pruned once the map reaches this size.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Configuration for the assessment engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub estimator: EstimatorConfig,
    pub policy: PolicyConfig,
    /// Retries on transient contextualizer errors.
    pub context_max_retries: u32,
    /// Delay before the first retry; doubled on each subsequent one.
    pub context_retry_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            estimator: EstimatorConfig::default(),
            policy: PolicyConfig::default(),
            context_max_retries: 2,
            context_retry_delay: Duration::from_millis(500),
        }
    }
}

/// An item as served to the learner. The canonical answer is never exposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRef {
    pub id: ItemId,
    pub statement: String,
    pub difficulty: f64,
    pub context: ItemContext,
}

/// What a learner sees after each engine call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleOutcome {
    pub finalized: bool,
    pub reason: Option<FinalizeReason>,
    pub theta: f64,
    pub standard_error: f64,
    pub next_item: Option<ItemRef>,
    /// Server-computed; the client value is never used here.
    pub remaining_seconds: u64,
    pub items_answered: usize,
    /// Grade of the answer submitted in this call, if any.
    pub last_response: Option<Evaluation>,
}

/// Orchestrates adaptive sessions against a store and a contextualizer.
pub struct AssessmentEngine {
    store: Arc<dyn AssessmentStore>,
    contextualizer: Arc<dyn Contextualizer>,
    clock: Arc<dyn Clock>,
    estimator: AbilityEstimator,
    selector: ItemSelector,
    policy: SessionPolicy,
    recorder: AttemptRecorder,
    config: EngineConfig,
    locks: Mutex<HashMap<LearnerId, Arc<Mutex<()>>>>,
}

impl AssessmentEngine {
    pub fn new(
        store: Arc<dyn AssessmentStore>,
        contextualizer: Arc<dyn Contextualizer>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            contextualizer,
            clock: Arc::new(SystemClock),
            estimator: AbilityEstimator::new(config.estimator.clone()),
            selector: ItemSelector::new(),
            policy: SessionPolicy::new(config.policy.clone()),
            recorder: AttemptRecorder::new(),
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the wall clock, e.g. with a [`ManualClock`](crate::traits::ManualClock).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Enter the session: create it on first access and serve the current item.
    ///
    /// Repeated calls within the reservation window return the same item.
    #[tracing::instrument(skip(self), fields(learner_id = learner.id))]
    pub async fn next_item(&self, learner: &Learner) -> Result<CycleOutcome, AssessmentError> {
        ensure_student(learner)?;
        let lock = self.learner_lock(learner.id).await;
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let (mut session, expected_version) = self.load_or_open(learner.id, now).await?;
        let responses = self.store.responses(learner.id).await?;

        if session.is_finalized {
            return Ok(self.outcome(&session, responses.len(), None, None, now));
        }
        if self.policy.is_expired(&session, now) {
            self.policy
                .finalize(&mut session, FinalizeReason::TimeExpired, now);
            let stored = self
                .commit(session, expected_version, None, None)
                .await?;
            return Ok(self.outcome(&stored, responses.len(), None, None, now));
        }

        let catalog = self.store.catalog().await?;
        let answered: HashSet<ItemId> = responses.iter().map(|r| r.item_id).collect();

        if let Some(reserved) = self.policy.live_reservation(&session, now) {
            if !answered.contains(&reserved) {
                if let Some(item) = catalog.iter().find(|item| item.id == reserved) {
                    tracing::debug!(item_id = reserved, "re-serving reserved item");
                    let next = self.serve(item).await;
                    return Ok(self.outcome(&session, responses.len(), Some(next), None, now));
                }
            }
        }

        let served = match self
            .selector
            .select_next(session.theta, &answered, &catalog)
        {
            Some(item) => {
                session.reserve(item.id, now);
                Some(item.clone())
            }
            None => {
                self.policy
                    .finalize(&mut session, FinalizeReason::NoItemsAvailable, now);
                None
            }
        };

        let stored = self
            .commit(session, expected_version, None, served.as_ref().map(|i| i.id))
            .await?;
        let next = match &served {
            Some(item) => Some(self.serve(item).await),
            None => None,
        };
        Ok(self.outcome(&stored, responses.len(), next, None, now))
    }

    /// Grade a submission and advance the session by one cycle.
    #[tracing::instrument(
        skip(self, submission),
        fields(learner_id = learner.id, item_id = submission.item_id)
    )]
    pub async fn submit_answer(
        &self,
        learner: &Learner,
        submission: Submission,
    ) -> Result<CycleOutcome, AssessmentError> {
        ensure_student(learner)?;
        let lock = self.learner_lock(learner.id).await;
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let (mut session, expected_version) = self.load_or_open(learner.id, now).await?;
        let responses = self.store.responses(learner.id).await?;

        if session.is_finalized {
            tracing::info!("submission ignored, session already finalized");
            return Ok(self.outcome(&session, responses.len(), None, None, now));
        }
        if self.policy.is_expired(&session, now) {
            self.policy
                .finalize(&mut session, FinalizeReason::TimeExpired, now);
            let stored = self
                .commit(session, expected_version, None, None)
                .await?;
            return Ok(self.outcome(&stored, responses.len(), None, None, now));
        }

        let catalog = self.store.catalog().await?;
        let by_id: HashMap<ItemId, &Item> = catalog.iter().map(|item| (item.id, item)).collect();

        let item = by_id
            .get(&submission.item_id)
            .copied()
            .ok_or(AssessmentError::UnknownItem(submission.item_id))?;
        let mut answered: HashSet<ItemId> = responses.iter().map(|r| r.item_id).collect();
        if answered.contains(&item.id) {
            return Err(AssessmentError::ItemAlreadyAnswered(item.id));
        }

        if let Some(client_remaining) = submission.client_remaining_secs {
            self.policy.check_client_time(&session, client_remaining, now);
        }

        let event = self.recorder.record(&session, item, &submission, now);
        let evaluation = Evaluation {
            is_correct: event.is_correct,
            score: event.score,
        };
        answered.insert(item.id);

        let history = observations(responses.iter().chain(std::iter::once(&event)), &by_id);
        let estimate = self.estimator.estimate(&history);
        session.theta = estimate.theta;
        session.standard_error = estimate.standard_error;
        session.clear_reservation();

        let items_answered = responses.len() + 1;
        tracing::info!(
            theta = estimate.theta,
            standard_error = estimate.standard_error,
            quality = ?estimate.quality,
            items_answered,
            "ability re-estimated"
        );

        let mut served = None;
        match self.policy.evaluate(&session, items_answered, now) {
            Some(reason) => self.policy.finalize(&mut session, reason, now),
            None => match self
                .selector
                .select_next(session.theta, &answered, &catalog)
            {
                Some(next) => {
                    session.reserve(next.id, now);
                    served = Some(next.clone());
                }
                None => {
                    self.policy
                        .finalize(&mut session, FinalizeReason::NoItemsAvailable, now)
                }
            },
        }

        let stored = self
            .commit(
                session,
                expected_version,
                Some(event),
                served.as_ref().map(|i| i.id),
            )
            .await?;
        let next = match &served {
            Some(item) => Some(self.serve(item).await),
            None => None,
        };
        Ok(self.outcome(&stored, items_answered, next, Some(evaluation), now))
    }

    /// Administrative reset: the learner is treated as first-time afterwards.
    #[tracing::instrument(skip(self))]
    pub async fn reset(&self, learner_id: LearnerId) -> Result<ResetSummary, AssessmentError> {
        let lock = self.learner_lock(learner_id).await;
        let _guard = lock.lock().await;
        let summary = self.store.reset(learner_id).await?;
        self.release_lock(learner_id, &lock).await;
        tracing::info!(
            responses_removed = summary.responses_removed,
            session_removed = summary.session_removed,
            "learner reset"
        );
        Ok(summary)
    }

    /// The stored session record, without side effects.
    pub async fn session(
        &self,
        learner_id: LearnerId,
    ) -> Result<Option<AbilityEstimate>, AssessmentError> {
        Ok(self.store.load_session(learner_id).await?)
    }

    async fn learner_lock(&self, learner_id: LearnerId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        if locks.len() >= LOCK_PRUNE_THRESHOLD {
            // Only the map holds these; no task is waiting on them.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Arc::clone(locks.entry(learner_id).or_default())
    }

    /// Drop the learner's lock entry unless another task holds a handle to it.
    async fn release_lock(&self, learner_id: LearnerId, held: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        let idle = locks
            .get(&learner_id)
            .is_some_and(|lock| Arc::ptr_eq(lock, held) && Arc::strong_count(lock) == 2);
        if idle {
            locks.remove(&learner_id);
        }
    }

    async fn load_or_open(
        &self,
        learner_id: LearnerId,
        now: DateTime<Utc>,
    ) -> Result<(AbilityEstimate, Option<u64>), AssessmentError> {
        match self.store.load_session(learner_id).await? {
            Some(session) => {
                let version = session.version;
                Ok((session, Some(version)))
            }
            None => Ok((self.policy.open_session(learner_id, now), None)),
        }
    }

    async fn commit(
        &self,
        estimate: AbilityEstimate,
        expected_version: Option<u64>,
        response: Option<ResponseEvent>,
        served_item: Option<ItemId>,
    ) -> Result<AbilityEstimate, AssessmentError> {
        let learner_id = estimate.learner_id;
        self.store
            .commit(SessionCommit {
                estimate,
                expected_version,
                response,
                served_item,
            })
            .await
            .map_err(|e| {
                tracing::error!(learner_id, "session commit failed: {e}");
                AssessmentError::from(e)
            })
    }

    async fn serve(&self, item: &Item) -> ItemRef {
        ItemRef {
            id: item.id,
            statement: item.statement.clone(),
            difficulty: item.difficulty,
            context: self.contextualize(item).await,
        }
    }

    /// Best-effort enrichment with exponential backoff on transient errors.
    async fn contextualize(&self, item: &Item) -> ItemContext {
        let mut retry_delay = self.config.context_retry_delay;
        for attempt in 0..=self.config.context_max_retries {
            if attempt > 0 {
                tokio::time::sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
            }
            match self.contextualizer.contextualize(item).await {
                Ok(context) => return context,
                Err(e) => {
                    let classified = e.downcast_ref::<ContextError>();
                    if classified.is_some_and(ContextError::is_permanent) {
                        tracing::warn!(
                            item_id = item.id,
                            contextualizer = self.contextualizer.name(),
                            "contextualization failed permanently: {e:#}"
                        );
                        break;
                    }
                    if let Some(ms) = classified.and_then(ContextError::retry_after_ms) {
                        let hinted = Duration::from_millis(ms);
                        if hinted > MAX_RETRY_DELAY {
                            tracing::warn!(
                                item_id = item.id,
                                retry_after_ms = ms,
                                contextualizer = self.contextualizer.name(),
                                "retry-after exceeds the retry cap, serving plain item"
                            );
                            break;
                        }
                        retry_delay = hinted;
                    }
                    tracing::warn!(
                        item_id = item.id,
                        attempt,
                        contextualizer = self.contextualizer.name(),
                        "contextualization failed: {e:#}"
                    );
                }
            }
        }
        ItemContext::fallback(item)
    }

    fn outcome(
        &self,
        session: &AbilityEstimate,
        items_answered: usize,
        next_item: Option<ItemRef>,
        last_response: Option<Evaluation>,
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        CycleOutcome {
            finalized: session.is_finalized,
            reason: session.finalize_reason,
            theta: session.theta,
            standard_error: session.standard_error,
            next_item,
            remaining_seconds: if session.is_finalized {
                0
            } else {
                session.remaining_seconds(now)
            },
            items_answered,
            last_response,
        }
    }
}

fn ensure_student(learner: &Learner) -> Result<(), AssessmentError> {
    if learner.role == LearnerRole::Student {
        Ok(())
    } else {
        Err(AssessmentError::NotAStudent(learner.id))
    }
}

/// Pair each response with its item difficulty. Responses to items no longer
/// in the catalog are skipped.
fn observations<'a>(
    responses: impl Iterator<Item = &'a ResponseEvent>,
    by_id: &HashMap<ItemId, &Item>,
) -> Vec<Observation> {
    responses
        .filter_map(|response| match by_id.get(&response.item_id) {
            Some(item) => Some(Observation::new(item.difficulty, response.is_correct)),
            None => {
                tracing::warn!(item_id = response.item_id, "response references unknown item");
                None
            }
        })
        .collect()
}
