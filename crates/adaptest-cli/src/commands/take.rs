//! The `adaptest take` command: an interactive session on the terminal.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use adaptest_core::bank::load_items;
use adaptest_core::engine::{AssessmentEngine, CycleOutcome};
use adaptest_core::model::Learner;
use adaptest_core::recorder::Submission;
use adaptest_core::store::MemoryStore;
use adaptest_providers::config::{create_contextualizer, load_config_from};

pub async fn execute(bank_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let items = load_items(&bank_path)?;
    anyhow::ensure!(!items.is_empty(), "item bank contains no items");

    let contextualizer = create_contextualizer(&config.contextualizer)?;
    let engine = AssessmentEngine::new(
        Arc::new(MemoryStore::new(items)),
        contextualizer,
        config.engine_config(),
    );
    let learner = Learner::student(1);

    println!("Type your answer after each statement. Ctrl-D ends the session.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut outcome = engine.next_item(&learner).await?;
    let mut number = 1;

    while let Some(item) = outcome.next_item.take() {
        println!("Item {number}: {}", item.context.display_text);
        if let Some(hint) = &item.context.hint {
            println!("  hint: {hint}");
        }
        if let Some(note) = &item.context.note {
            println!("  ({note})");
        }

        let Some(answer) = lines.next_line().await? else {
            println!("\nSession left open: {}", progress_line(&outcome));
            return Ok(());
        };

        outcome = engine
            .submit_answer(&learner, Submission::new(item.id, answer.trim()))
            .await?;
        let verdict = match &outcome.last_response {
            Some(evaluation) if evaluation.is_correct => "correct",
            Some(_) => "incorrect",
            None => "not recorded",
        };
        println!("  {verdict}. {}\n", progress_line(&outcome));
        number += 1;
    }

    let reason = outcome
        .reason
        .map(|r| r.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!(
        "Session finished ({reason}): theta {:+.3}, SE {:.3} after {} items.",
        outcome.theta, outcome.standard_error, outcome.items_answered
    );
    Ok(())
}

fn progress_line(outcome: &CycleOutcome) -> String {
    format!(
        "theta {:+.3}, SE {:.3}, {}s remaining",
        outcome.theta, outcome.standard_error, outcome.remaining_seconds
    )
}
