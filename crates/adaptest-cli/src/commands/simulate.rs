//! The `adaptest simulate` command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use adaptest_core::bank::load_items;
use adaptest_core::report::{LearnerResult, SimulationReport};
use adaptest_core::simulation::{run_simulation, ProgressReporter, SimulationConfig};
use adaptest_core::model::LearnerId;
use adaptest_providers::config::load_config_from;

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_learner_complete(&self, result: &LearnerResult) {
        let reason = result
            .reason
            .map(|r| r.to_string())
            .unwrap_or_else(|| "active".to_string());
        eprintln!(
            "  Done: learner {} (true {:+.2}) estimate {:+.3} SE {:.3} after {} items [{}]",
            result.learner_id,
            result.true_theta,
            result.estimated_theta,
            result.standard_error,
            result.items_answered,
            reason,
        );
    }

    fn on_learner_error(&self, learner_id: LearnerId, error: &str) {
        eprintln!("  ERROR: learner {learner_id}: {error}");
    }

    fn on_simulation_complete(&self, total: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {}/{total} sessions finalized, {failed} failed ({:.1}s)",
            total - failed,
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(
    bank_path: PathBuf,
    thetas_str: String,
    learners: usize,
    parallelism: Option<usize>,
    seed: u64,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    let parallelism = parallelism.unwrap_or(config.engine.parallelism);
    anyhow::ensure!(parallelism >= 1, "parallelism must be at least 1");
    anyhow::ensure!(learners >= 1, "learners must be at least 1");

    let true_thetas = parse_thetas(&thetas_str)?;
    let items = load_items(&bank_path)?;

    eprintln!(
        "adaptest v{}: simulating {} abilities x {} learners against {} items",
        env!("CARGO_PKG_VERSION"),
        true_thetas.len(),
        learners,
        items.len()
    );
    eprintln!();

    let sim_config = SimulationConfig {
        true_thetas,
        learners_per_theta: learners,
        parallelism,
        seed,
        engine: config.engine_config(),
    };
    let report = run_simulation(items, &sim_config, &ConsoleReporter).await?;

    print_summary(&report);

    let output = output.unwrap_or(config.engine.output_dir);
    std::fs::create_dir_all(&output)?;
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");
    let path = output.join(format!("simulation-{timestamp}.json"));
    report.save_json(&path)?;
    eprintln!("Results saved to: {}", path.display());

    Ok(())
}

fn parse_thetas(s: &str) -> Result<Vec<f64>> {
    let thetas = s
        .split(',')
        .map(|t| {
            let t = t.trim();
            let theta: f64 = t
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid theta value: '{t}'"))?;
            anyhow::ensure!(
                (-3.0..=3.0).contains(&theta),
                "theta {theta} outside [-3, 3]"
            );
            Ok(theta)
        })
        .collect::<Result<Vec<_>>>()?;
    anyhow::ensure!(!thetas.is_empty(), "at least one theta is required");
    Ok(thetas)
}

fn print_summary(report: &SimulationReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec![
        "True θ",
        "Learners",
        "Mean θ̂",
        "Bias",
        "RMSE",
        "Mean SE",
        "Mean items",
        "Precision reached",
    ]);

    for row in &report.summary {
        table.add_row(vec![
            Cell::new(format!("{:+.2}", row.true_theta)),
            Cell::new(row.learners),
            Cell::new(format!("{:+.3}", row.mean_estimate)),
            Cell::new(format!("{:+.3}", row.bias)),
            Cell::new(format!("{:.3}", row.rmse)),
            Cell::new(format!("{:.3}", row.mean_standard_error)),
            Cell::new(format!("{:.1}", row.mean_items)),
            Cell::new(format!("{}/{}", row.precision_reached, row.learners)),
        ]);
    }

    println!("{table}");
}
