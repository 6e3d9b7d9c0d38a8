//! File configuration and contextualizer factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use adaptest_core::engine::EngineConfig;
use adaptest_core::estimator::EstimatorConfig;
use adaptest_core::policy::PolicyConfig;
use adaptest_core::traits::{Contextualizer, PassthroughContextualizer};

use crate::openai::{OpenAiContextualizer, DEFAULT_MODEL};

/// Which contextualizer backend to use.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContextualizerConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default = "default_model")]
        model: String,
    },
    #[default]
    Passthrough,
}

impl std::fmt::Debug for ContextualizerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextualizerConfig::OpenAI {
                api_key: _,
                base_url,
                model,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("model", model)
                .finish(),
            ContextualizerConfig::Passthrough => f.write_str("Passthrough"),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Top-level adaptest configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdaptestConfig {
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub contextualizer: ContextualizerConfig,
    #[serde(default)]
    pub engine: EngineSettings,
}

/// Engine knobs that are not part of the estimator or the policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Retries on transient contextualizer errors.
    pub context_max_retries: u32,
    /// Delay before the first retry in milliseconds.
    pub context_retry_delay_ms: u64,
    /// Max concurrent simulated sessions.
    pub parallelism: usize,
    /// Output directory for simulation reports.
    pub output_dir: PathBuf,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            context_max_retries: 2,
            context_retry_delay_ms: 500,
            parallelism: 4,
            output_dir: PathBuf::from("./adaptest-results"),
        }
    }
}

impl AdaptestConfig {
    /// Assemble the engine configuration from the file sections.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            estimator: self.estimator.clone(),
            policy: self.policy.clone(),
            context_max_retries: self.engine.context_max_retries,
            context_retry_delay: Duration::from_millis(self.engine.context_retry_delay_ms),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
///
/// Substituted values are inserted verbatim and never expanded again.
fn resolve_env_vars(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        let var_name = &rest[start + 2..start + len];
        result.push_str(&rest[..start]);
        result.push_str(&std::env::var(var_name).unwrap_or_default());
        rest = &rest[start + len + 1..];
    }
    result.push_str(rest);
    result
}

/// Resolve env vars in a contextualizer config.
fn resolve_contextualizer_config(config: &ContextualizerConfig) -> ContextualizerConfig {
    match config {
        ContextualizerConfig::OpenAI {
            api_key,
            base_url,
            model,
        } => ContextualizerConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
            model: resolve_env_vars(model),
        },
        ContextualizerConfig::Passthrough => ContextualizerConfig::Passthrough,
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `adaptest.toml` in the current directory
/// 2. `~/.config/adaptest/config.toml`
///
/// `ADAPTEST_OPENAI_KEY` overrides the API key of an OpenAI contextualizer.
pub fn load_config() -> Result<AdaptestConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<AdaptestConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("adaptest.toml");
        if local.exists() {
            Some(local)
        } else if let Some(home) = dirs_path() {
            let global = home.join("config.toml");
            if global.exists() {
                Some(global)
            } else {
                None
            }
        } else {
            None
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => AdaptestConfig::default(),
    };

    if let Ok(key) = std::env::var("ADAPTEST_OPENAI_KEY") {
        if let ContextualizerConfig::OpenAI { api_key, .. } = &mut config.contextualizer {
            *api_key = key;
        }
    }

    Ok(config)
}

/// Parse a TOML config string and resolve `${VAR}` references.
pub fn parse_config(content: &str) -> Result<AdaptestConfig> {
    let mut config: AdaptestConfig = toml::from_str(content)?;
    config.contextualizer = resolve_contextualizer_config(&config.contextualizer);
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("adaptest"))
}

/// Create a contextualizer instance from its configuration.
pub fn create_contextualizer(config: &ContextualizerConfig) -> Result<Arc<dyn Contextualizer>> {
    match config {
        ContextualizerConfig::OpenAI {
            api_key,
            base_url,
            model,
        } => {
            if api_key.trim().is_empty() {
                anyhow::bail!(
                    "OpenAI contextualizer configured without an API key \
                     (set api_key or ADAPTEST_OPENAI_KEY)"
                );
            }
            Ok(Arc::new(OpenAiContextualizer::new(
                api_key,
                base_url.clone(),
                Some(model.clone()),
            )?))
        }
        ContextualizerConfig::Passthrough => Ok(Arc::new(PassthroughContextualizer)),
    }
}
