//! Collaborator traits: clocks and item contextualizers.
//!
//! Contextualizers are implemented by the `adaptest-providers` crate; the
//! pass-through implementation here is what the engine falls back to.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Item;

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of the server-side "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used by tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Contextualizer
// ---------------------------------------------------------------------------

/// Note attached to an item when enrichment was unavailable.
pub const FALLBACK_NOTE: &str = "could not generate enriched context";

/// Presentation payload for a served item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemContext {
    /// Text to display; the verbatim statement when not enriched.
    pub display_text: String,
    #[serde(default)]
    pub hint: Option<String>,
    #[serde(default)]
    pub learning_objective: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Set when the payload is a fallback rather than an enrichment.
    #[serde(default)]
    pub note: Option<String>,
}

impl ItemContext {
    /// The item statement verbatim, with no enrichment.
    pub fn plain(item: &Item) -> Self {
        Self {
            display_text: item.statement.clone(),
            hint: None,
            learning_objective: None,
            tags: item.tags.clone(),
            note: None,
        }
    }

    /// The plain payload, marked as a fallback after a failed enrichment.
    pub fn fallback(item: &Item) -> Self {
        Self {
            note: Some(FALLBACK_NOTE.to_string()),
            ..Self::plain(item)
        }
    }
}

/// Best-effort enrichment of an item statement (rephrasing, hints).
#[async_trait]
pub trait Contextualizer: Send + Sync {
    /// Human-readable backend name (e.g. "openai").
    fn name(&self) -> &str;

    /// Produce a presentation payload for `item`.
    async fn contextualize(&self, item: &Item) -> anyhow::Result<ItemContext>;
}

/// Returns the item statement verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughContextualizer;

#[async_trait]
impl Contextualizer for PassthroughContextualizer {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn contextualize(&self, item: &Item) -> anyhow::Result<ItemContext> {
        Ok(ItemContext::plain(item))
    }
}

// ---------------------------------------------------------------------------
// JSON extraction
// ---------------------------------------------------------------------------

/// Extract the outermost JSON object from a model response.
///
/// Handles:
/// - a bare JSON object
/// - an object wrapped in prose or a ```json fenced block
///
/// Returns `None` if no `{ ... }` span is present.
pub fn extract_json_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&response[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        clock.advance(Duration::seconds(30));
        assert_eq!(clock.now(), start + Duration::seconds(30));
        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[tokio::test]
    async fn passthrough_returns_statement() {
        let mut item = Item::new(1, "Solve 2x + 1 = 5", "x=2", 0.0);
        item.tags = vec!["funciones".into()];
        let ctx = PassthroughContextualizer.contextualize(&item).await.unwrap();
        assert_eq!(ctx.display_text, "Solve 2x + 1 = 5");
        assert_eq!(ctx.tags, vec!["funciones"]);
        assert!(ctx.note.is_none());
    }

    #[test]
    fn fallback_carries_note() {
        let item = Item::new(1, "Solve 2x + 1 = 5", "x=2", 0.0);
        let ctx = ItemContext::fallback(&item);
        assert_eq!(ctx.display_text, item.statement);
        assert_eq!(ctx.note.as_deref(), Some(FALLBACK_NOTE));
    }

    #[test]
    fn extract_bare_object() {
        assert_eq!(extract_json_object(r#"{"a": 1}"#), Some(r#"{"a": 1}"#));
    }

    #[test]
    fn extract_fenced_object() {
        let input = "Here you go:\n```json\n{\"display_text\": \"hi\", \"tags\": {\"x\": 1}}\n```\n";
        assert_eq!(
            extract_json_object(input),
            Some("{\"display_text\": \"hi\", \"tags\": {\"x\": 1}}")
        );
    }

    #[test]
    fn extract_without_object() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }
}
