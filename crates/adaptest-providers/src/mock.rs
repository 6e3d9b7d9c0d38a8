//! Mock contextualizer for testing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use adaptest_core::model::Item;
use adaptest_core::traits::{Contextualizer, ItemContext};

use crate::error::ContextError;

/// A mock contextualizer for testing the engine without real API calls.
///
/// Prefixes each statement with a marker, or fails with a configurable error.
pub struct MockContextualizer {
    /// Prefix prepended to the statement.
    prefix: String,
    /// Error returned while `failures_remaining` is non-zero.
    failure: Option<fn() -> ContextError>,
    failures_remaining: AtomicU32,
    /// Number of calls made.
    call_count: AtomicU32,
    /// Last item received.
    last_item: Mutex<Option<Item>>,
}

impl MockContextualizer {
    /// A mock that always succeeds with `"[mock] <statement>"`.
    pub fn new() -> Self {
        Self::with_prefix("[mock] ")
    }

    /// A mock that always succeeds with `"<prefix><statement>"`.
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            failure: None,
            failures_remaining: AtomicU32::new(0),
            call_count: AtomicU32::new(0),
            last_item: Mutex::new(None),
        }
    }

    /// A mock that always fails with the error built by `error`.
    pub fn failing(error: fn() -> ContextError) -> Self {
        Self::failing_first(u32::MAX, error)
    }

    /// A mock that fails `times` calls, then succeeds.
    pub fn failing_first(times: u32, error: fn() -> ContextError) -> Self {
        Self {
            failure: Some(error),
            failures_remaining: AtomicU32::new(times),
            ..Self::new()
        }
    }

    /// Get the number of calls made to this contextualizer.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last item passed to this contextualizer.
    pub fn last_item(&self) -> Option<Item> {
        self.last_item
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for MockContextualizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Contextualizer for MockContextualizer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn contextualize(&self, item: &Item) -> anyhow::Result<ItemContext> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_item.lock().unwrap_or_else(|e| e.into_inner()) = Some(item.clone());

        if let Some(error) = self.failure {
            let remaining = self.failures_remaining.load(Ordering::Relaxed);
            if remaining > 0 {
                self.failures_remaining
                    .store(remaining - 1, Ordering::Relaxed);
                return Err(error().into());
            }
        }

        Ok(ItemContext {
            display_text: format!("{}{}", self.prefix, item.statement),
            ..ItemContext::plain(item)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prefixes_statement() {
        let mock = MockContextualizer::new();
        let item = Item::new(1, "Calcula 3^2", "9", -2.0);
        let ctx = mock.contextualize(&item).await.unwrap();
        assert_eq!(ctx.display_text, "[mock] Calcula 3^2");
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.last_item().unwrap().id, 1);
    }

    #[tokio::test]
    async fn fails_then_recovers() {
        let mock = MockContextualizer::failing_first(2, || ContextError::Timeout(1));
        let item = Item::new(1, "Calcula 3^2", "9", -2.0);
        assert!(mock.contextualize(&item).await.is_err());
        let err = mock.contextualize(&item).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ContextError>(),
            Some(ContextError::Timeout(1))
        ));
        assert!(mock.contextualize(&item).await.is_ok());
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn always_failing() {
        let mock =
            MockContextualizer::failing(|| ContextError::AuthenticationFailed("nope".into()));
        let item = Item::new(1, "Calcula 3^2", "9", -2.0);
        for _ in 0..5 {
            assert!(mock.contextualize(&item).await.is_err());
        }
    }
}
