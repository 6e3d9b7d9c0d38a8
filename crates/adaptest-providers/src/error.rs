//! Contextualizer error types.
//!
//! The error enum lives in `adaptest-core` so the engine can classify
//! failures for retries; it is re-exported here for provider code.

pub use adaptest_core::error::ContextError;
