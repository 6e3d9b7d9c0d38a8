//! End-to-end session tests: the engine against the in-memory store, a manual
//! clock and the mock contextualizer.

use std::sync::Arc;

use chrono::{Duration, Utc};

use adaptest_core::engine::{AssessmentEngine, EngineConfig};
use adaptest_core::error::AssessmentError;
use adaptest_core::model::{FinalizeReason, Item, ItemId, Learner};
use adaptest_core::policy::PolicyConfig;
use adaptest_core::recorder::Submission;
use adaptest_core::store::{AssessmentStore, MemoryStore, SessionCommit};
use adaptest_core::traits::ManualClock;
use adaptest_providers::mock::MockContextualizer;

/// 41 items with difficulties from -3 to 3 in steps of 0.15.
fn catalog() -> Vec<Item> {
    (0..41)
        .map(|i| {
            let b = -3.0 + 0.15 * i as f64;
            Item::new(i + 1, &format!("Ejercicio {}", i + 1), &format!("r{}", i + 1), b)
        })
        .collect()
}

struct Harness {
    engine: Arc<AssessmentEngine>,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    items: Vec<Item>,
}

fn harness(policy: PolicyConfig) -> Harness {
    let items = catalog();
    let store = Arc::new(MemoryStore::new(items.clone()));
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = AssessmentEngine::new(
        store.clone(),
        Arc::new(MockContextualizer::new()),
        EngineConfig {
            policy,
            ..EngineConfig::default()
        },
    )
    .with_clock(clock.clone());
    Harness {
        engine: Arc::new(engine),
        store,
        clock,
        items,
    }
}

impl Harness {
    /// The answer a learner who knows everything easier than `ability` would give.
    fn answer_for(&self, item_id: ItemId, ability: f64) -> String {
        let item = self.items.iter().find(|i| i.id == item_id).unwrap();
        if item.difficulty < ability {
            item.canonical_answer.clone()
        } else {
            "no lo se".to_string()
        }
    }

    async fn answer_n(&self, learner: &Learner, ability: f64, n: usize) -> f64 {
        let mut outcome = self.engine.next_item(learner).await.unwrap();
        for _ in 0..n {
            let item = outcome.next_item.take().unwrap();
            let answer = self.answer_for(item.id, ability);
            outcome = self
                .engine
                .submit_answer(learner, Submission::new(item.id, &answer))
                .await
                .unwrap();
        }
        outcome.theta
    }
}

#[tokio::test]
async fn first_item_is_chosen_at_neutral_ability() {
    let h = harness(PolicyConfig::default());
    let outcome = h.engine.next_item(&Learner::student(1)).await.unwrap();

    assert!(!outcome.finalized);
    assert_eq!(outcome.theta, 0.0);
    assert_eq!(outcome.standard_error, 1.0);
    assert_eq!(outcome.items_answered, 0);
    assert_eq!(outcome.remaining_seconds, 3540);

    let item = outcome.next_item.unwrap();
    assert_eq!(item.id, 21);
    assert_eq!(item.context.display_text, "[mock] Ejercicio 21");
}

#[tokio::test]
async fn stronger_learners_are_estimated_higher() {
    let h = harness(PolicyConfig::default());
    let strong = h.answer_n(&Learner::student(1), 1.0, 10).await;
    let weak = h.answer_n(&Learner::student(2), -1.0, 10).await;
    assert!(strong > weak, "strong {strong} should exceed weak {weak}");
}

#[tokio::test]
async fn session_stops_at_the_item_cap() {
    let h = harness(PolicyConfig {
        precision_threshold: 0.0,
        ..PolicyConfig::default()
    });
    let learner = Learner::student(1);

    let mut outcome = h.engine.next_item(&learner).await.unwrap();
    while let Some(item) = outcome.next_item.take() {
        let answer = h.answer_for(item.id, 0.5);
        outcome = h
            .engine
            .submit_answer(&learner, Submission::new(item.id, &answer))
            .await
            .unwrap();
    }

    assert!(outcome.finalized);
    assert_eq!(outcome.reason, Some(FinalizeReason::ItemCapReached));
    assert_eq!(outcome.items_answered, 30);
    assert_eq!(outcome.remaining_seconds, 0);
    assert_eq!(h.store.responses(1).await.unwrap().len(), 30);
}

#[tokio::test]
async fn time_budget_is_enforced_by_the_server_clock() {
    let h = harness(PolicyConfig::default());
    let learner = Learner::student(1);
    let item = h.engine.next_item(&learner).await.unwrap().next_item.unwrap();

    h.clock.advance(Duration::seconds(3541));
    let submission = Submission {
        client_remaining_secs: Some(1200.0),
        ..Submission::new(item.id, "r21")
    };
    let outcome = h.engine.submit_answer(&learner, submission).await.unwrap();

    assert!(outcome.finalized);
    assert_eq!(outcome.reason, Some(FinalizeReason::TimeExpired));
    assert!(outcome.next_item.is_none());
    assert!(outcome.last_response.is_none());
    assert!(h.store.responses(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn finalized_session_ignores_further_submissions() {
    let h = harness(PolicyConfig::default());
    let learner = Learner::student(1);
    h.engine.next_item(&learner).await.unwrap();
    h.clock.advance(Duration::seconds(4000));
    let finished = h.engine.next_item(&learner).await.unwrap();
    assert_eq!(finished.reason, Some(FinalizeReason::TimeExpired));

    let again = h
        .engine
        .submit_answer(&learner, Submission::new(5, "r5"))
        .await
        .unwrap();
    assert_eq!(again, finished);
}

#[tokio::test]
async fn reset_makes_the_learner_first_time() {
    let h = harness(PolicyConfig::default());
    let learner = Learner::student(7);
    h.answer_n(&learner, 1.0, 4).await;

    let summary = h.engine.reset(7).await.unwrap();
    assert_eq!(summary.responses_removed, 4);
    assert!(summary.session_removed);
    assert!(h.engine.session(7).await.unwrap().is_none());

    let outcome = h.engine.next_item(&learner).await.unwrap();
    assert_eq!(outcome.items_answered, 0);
    assert_eq!(outcome.theta, 0.0);
    assert_eq!(outcome.next_item.unwrap().id, 21);
}

#[tokio::test]
async fn reserved_item_is_reserved_until_the_ttl_lapses() {
    let h = harness(PolicyConfig::default());
    let learner = Learner::student(1);

    let first = h.engine.next_item(&learner).await.unwrap();
    h.clock.advance(Duration::seconds(120));
    let second = h.engine.next_item(&learner).await.unwrap();
    assert_eq!(first.next_item.unwrap().id, second.next_item.unwrap().id);
    assert_eq!(h.store.item_stats(21).await.unwrap().times_served, 1);

    // After the TTL the item is selected afresh, which counts as a new exposure.
    h.clock.advance(Duration::seconds(600));
    let third = h.engine.next_item(&learner).await.unwrap();
    assert_eq!(third.next_item.unwrap().id, 21);
    assert_eq!(h.store.item_stats(21).await.unwrap().times_served, 2);
}

#[tokio::test]
async fn concurrent_submissions_record_the_item_once() {
    let h = harness(PolicyConfig::default());
    let learner = Learner::student(1);
    let item_id = h.engine.next_item(&learner).await.unwrap().next_item.unwrap().id;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&h.engine);
            tokio::spawn(async move {
                engine
                    .submit_answer(&learner, Submission::new(item_id, "r21"))
                    .await
            })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(AssessmentError::ItemAlreadyAnswered(id)) => assert_eq!(id, item_id),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(h.store.responses(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn stale_version_is_rejected() {
    let h = harness(PolicyConfig::default());
    h.engine.next_item(&Learner::student(1)).await.unwrap();

    let session = h.store.load_session(1).await.unwrap().unwrap();
    let stale = session.version;
    let updated = h
        .store
        .commit(SessionCommit {
            estimate: session.clone(),
            expected_version: Some(stale),
            response: None,
            served_item: None,
        })
        .await
        .unwrap();
    assert_eq!(updated.version, stale + 1);

    let err = h
        .store
        .commit(SessionCommit {
            estimate: session,
            expected_version: Some(stale),
            response: None,
            served_item: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        AssessmentError::from(err),
        AssessmentError::Conflict(1)
    ));
}
