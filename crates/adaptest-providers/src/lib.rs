//! adaptest-providers: item contextualizers and file configuration.
//!
//! Implements the `Contextualizer` trait for OpenAI-compatible chat APIs and
//! for tests, and loads `adaptest.toml`.

pub mod config;
pub mod error;
pub mod mock;
pub mod openai;

pub use config::{
    create_contextualizer, load_config, load_config_from, AdaptestConfig, ContextualizerConfig,
};
pub use error::ContextError;
