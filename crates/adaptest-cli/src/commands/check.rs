//! The `adaptest check` command.

use anyhow::Result;

use adaptest_core::normalizer::{evaluate, normalize};

pub fn execute(given: &str, canonical: &str) -> Result<()> {
    let evaluation = evaluate(given, canonical);

    println!("given:     {}", normalize(given));
    println!("canonical: {}", normalize(canonical));
    println!(
        "verdict:   {} (score {:.1})",
        if evaluation.is_correct {
            "correct"
        } else {
            "incorrect"
        },
        evaluation.score
    );

    Ok(())
}
