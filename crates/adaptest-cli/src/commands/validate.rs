//! The `adaptest validate` command.

use std::path::PathBuf;

use anyhow::Result;

use adaptest_core::bank;

pub fn execute(bank_path: PathBuf) -> Result<()> {
    let banks = if bank_path.is_dir() {
        bank::load_bank_directory(&bank_path)?
    } else {
        vec![bank::parse_item_bank(&bank_path)?]
    };

    let mut total_warnings = 0;

    for b in &banks {
        println!("Item bank: {} ({} items)", b.name, b.items.len());

        let warnings = bank::validate_item_bank(b);
        for w in &warnings {
            let prefix = w
                .item_id
                .map(|id| format!("  [{id}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All item banks valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
