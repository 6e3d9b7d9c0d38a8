//! The `adaptest estimate` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use adaptest_core::estimator::AbilityEstimator;
use adaptest_core::model::Observation;
use adaptest_core::rasch::test_information;
use adaptest_providers::config::load_config_from;

pub fn execute(history_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    let content = std::fs::read_to_string(&history_path)
        .with_context(|| format!("failed to read history: {}", history_path.display()))?;
    let history: Vec<Observation> =
        serde_json::from_str(&content).context("failed to parse history JSON")?;

    let estimator = AbilityEstimator::new(config.estimator);
    let estimate = estimator.estimate(&history);
    let correct = history.iter().filter(|o| o.is_correct).count();

    println!("responses:      {} ({correct} correct)", history.len());
    println!("theta:          {:.4}", estimate.theta);
    println!("standard error: {:.4}", estimate.standard_error);
    println!(
        "information:    {:.4}",
        test_information(estimate.theta, &history)
    );
    println!("quality:        {:?}", estimate.quality);

    Ok(())
}
