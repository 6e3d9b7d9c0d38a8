//! Persistence collaborator for items, responses and session records.
//!
//! The engine needs four things from storage: read the catalog, read a
//! learner's session and responses, commit a session update together with
//! its response event atomically, and wipe a learner on administrative reset.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{AbilityEstimate, Item, ItemId, ItemStats, LearnerId, ResponseEvent};

/// One all-or-nothing write of a learner's session.
#[derive(Debug, Clone)]
pub struct SessionCommit {
    /// The session state to store. Its `version` is ignored; the store assigns it.
    pub estimate: AbilityEstimate,
    /// Version the writer read, or `None` if the session did not exist yet.
    pub expected_version: Option<u64>,
    /// Response event to append in the same write.
    pub response: Option<ResponseEvent>,
    /// Item newly served to the learner in this write.
    pub served_item: Option<ItemId>,
}

/// What an administrative reset removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetSummary {
    pub responses_removed: usize,
    pub session_removed: bool,
}

/// Durable storage for the assessment engine.
#[async_trait]
pub trait AssessmentStore: Send + Sync {
    /// The full read-only item catalog.
    async fn catalog(&self) -> Result<Arc<[Item]>, StoreError>;

    /// Look up a single item.
    async fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    /// The learner's session record, if one exists.
    async fn load_session(
        &self,
        learner_id: LearnerId,
    ) -> Result<Option<AbilityEstimate>, StoreError>;

    /// All responses recorded for the learner, oldest first.
    async fn responses(&self, learner_id: LearnerId) -> Result<Vec<ResponseEvent>, StoreError>;

    /// Atomically write a session update. Returns the stored record with its new version.
    ///
    /// Fails with [`StoreError::Conflict`] if the stored version differs from
    /// `expected_version`; nothing is written in that case.
    async fn commit(&self, commit: SessionCommit) -> Result<AbilityEstimate, StoreError>;

    /// Delete the learner's responses and session record.
    async fn reset(&self, learner_id: LearnerId) -> Result<ResetSummary, StoreError>;

    /// Exposure counters for an item.
    async fn item_stats(&self, item_id: ItemId) -> Result<ItemStats, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    sessions: HashMap<LearnerId, AbilityEstimate>,
    responses: HashMap<LearnerId, Vec<ResponseEvent>>,
    stats: HashMap<ItemId, ItemStats>,
}

/// In-process [`AssessmentStore`] backed by a single mutex.
#[derive(Debug)]
pub struct MemoryStore {
    catalog: Arc<[Item]>,
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Build a store over `items`. Only the first item with a given id is kept.
    pub fn new(items: Vec<Item>) -> Self {
        let mut seen = HashSet::new();
        let items: Vec<Item> = items
            .into_iter()
            .filter(|item| {
                let first = seen.insert(item.id);
                if !first {
                    tracing::warn!(item_id = item.id, "dropping duplicate catalog item");
                }
                first
            })
            .collect();
        Self {
            catalog: items.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl AssessmentStore for MemoryStore {
    async fn catalog(&self) -> Result<Arc<[Item]>, StoreError> {
        Ok(Arc::clone(&self.catalog))
    }

    async fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.catalog.iter().find(|item| item.id == id).cloned())
    }

    async fn load_session(
        &self,
        learner_id: LearnerId,
    ) -> Result<Option<AbilityEstimate>, StoreError> {
        Ok(self.lock()?.sessions.get(&learner_id).cloned())
    }

    async fn responses(&self, learner_id: LearnerId) -> Result<Vec<ResponseEvent>, StoreError> {
        Ok(self
            .lock()?
            .responses
            .get(&learner_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn commit(&self, commit: SessionCommit) -> Result<AbilityEstimate, StoreError> {
        let mut state = self.lock()?;
        let learner_id = commit.estimate.learner_id;

        let found = state.sessions.get(&learner_id).map(|s| s.version);
        if found != commit.expected_version {
            return Err(StoreError::Conflict {
                learner_id,
                expected: commit.expected_version.unwrap_or(0),
                found: found.unwrap_or(0),
            });
        }

        let mut stored = commit.estimate;
        stored.version = found.map_or(1, |v| v + 1);

        if let Some(event) = commit.response {
            let stats = state.stats.entry(event.item_id).or_default();
            stats.times_answered += 1;
            if event.is_correct {
                stats.times_correct += 1;
            }
            state.responses.entry(learner_id).or_default().push(event);
        }
        if let Some(item_id) = commit.served_item {
            state.stats.entry(item_id).or_default().times_served += 1;
        }

        state.sessions.insert(learner_id, stored.clone());
        Ok(stored)
    }

    async fn reset(&self, learner_id: LearnerId) -> Result<ResetSummary, StoreError> {
        let mut state = self.lock()?;
        let responses_removed = state
            .responses
            .remove(&learner_id)
            .map_or(0, |events| events.len());
        let session_removed = state.sessions.remove(&learner_id).is_some();
        Ok(ResetSummary {
            responses_removed,
            session_removed,
        })
    }

    async fn item_stats(&self, item_id: ItemId) -> Result<ItemStats, StoreError> {
        Ok(self
            .lock()?
            .stats
            .get(&item_id)
            .copied()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn store() -> MemoryStore {
        MemoryStore::new(vec![
            Item::new(1, "a", "1", -1.0),
            Item::new(2, "b", "2", 0.0),
        ])
    }

    fn event(learner_id: LearnerId, item_id: ItemId, is_correct: bool) -> ResponseEvent {
        ResponseEvent {
            id: Uuid::new_v4(),
            learner_id,
            item_id,
            given_answer: "x".into(),
            is_correct,
            score: if is_correct { 1.0 } else { 0.0 },
            elapsed_seconds: 1.0,
            timestamp: Utc::now(),
            steps: vec![],
        }
    }

    #[tokio::test]
    async fn commit_assigns_versions() {
        let store = store();
        let est = AbilityEstimate::new(1, Utc::now(), 60);
        let first = store
            .commit(SessionCommit {
                estimate: est.clone(),
                expected_version: None,
                response: None,
                served_item: Some(1),
            })
            .await
            .unwrap();
        assert_eq!(first.version, 1);

        let second = store
            .commit(SessionCommit {
                estimate: first.clone(),
                expected_version: Some(1),
                response: Some(event(1, 1, true)),
                served_item: None,
            })
            .await
            .unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(store.responses(1).await.unwrap().len(), 1);

        let stats = store.item_stats(1).await.unwrap();
        assert_eq!(stats.times_served, 1);
        assert_eq!(stats.times_answered, 1);
        assert_eq!(stats.times_correct, 1);
    }

    #[tokio::test]
    async fn stale_commit_is_rejected_without_writing() {
        let store = store();
        let est = AbilityEstimate::new(1, Utc::now(), 60);
        let stored = store
            .commit(SessionCommit {
                estimate: est,
                expected_version: None,
                response: None,
                served_item: None,
            })
            .await
            .unwrap();

        let err = store
            .commit(SessionCommit {
                estimate: stored.clone(),
                expected_version: None,
                response: Some(event(1, 2, false)),
                served_item: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { learner_id: 1, .. }));
        assert!(store.responses(1).await.unwrap().is_empty());
        assert_eq!(store.item_stats(2).await.unwrap(), ItemStats::default());
    }

    #[tokio::test]
    async fn reset_removes_everything_for_one_learner() {
        let store = store();
        for learner in [1, 2] {
            store
                .commit(SessionCommit {
                    estimate: AbilityEstimate::new(learner, Utc::now(), 60),
                    expected_version: None,
                    response: Some(event(learner, 1, true)),
                    served_item: None,
                })
                .await
                .unwrap();
        }

        let summary = store.reset(1).await.unwrap();
        assert_eq!(
            summary,
            ResetSummary {
                responses_removed: 1,
                session_removed: true
            }
        );
        assert!(store.load_session(1).await.unwrap().is_none());
        assert!(store.load_session(2).await.unwrap().is_some());

        // Resetting an unknown learner is a no-op.
        assert_eq!(store.reset(99).await.unwrap(), ResetSummary::default());
    }

    #[tokio::test]
    async fn duplicate_ids_keep_the_first_item() {
        let store = MemoryStore::new(vec![
            Item::new(1, "2+2", "4", 0.0),
            Item::new(1, "3+3", "6", 1.0),
        ]);
        let catalog = store.catalog().await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].canonical_answer, "4");
        assert_eq!(store.item(1).await.unwrap().unwrap().statement, "2+2");
    }

    #[tokio::test]
    async fn item_lookup() {
        let store = store();
        assert_eq!(store.item(2).await.unwrap().unwrap().difficulty, 0.0);
        assert!(store.item(3).await.unwrap().is_none());
        assert_eq!(store.catalog().await.unwrap().len(), 2);
    }
}
