//! TOML item-bank parser.
//!
//! Loads item banks from TOML files and directories, and validates them.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{Item, ItemId, THETA_MAX, THETA_MIN};

/// Accepted range for the (unused) discrimination parameter.
const DISCRIMINATION_RANGE: std::ops::RangeInclusive<f64> = 0.01..=2.0;

/// A named collection of calibrated items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemBank {
    pub id: String,
    pub name: String,
    pub description: String,
    pub items: Vec<Item>,
}

/// Intermediate TOML structure for parsing item bank files.
#[derive(Debug, Deserialize)]
struct TomlBankFile {
    bank: TomlBankHeader,
    #[serde(default)]
    items: Vec<TomlItem>,
}

#[derive(Debug, Deserialize)]
struct TomlBankHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct TomlItem {
    id: ItemId,
    statement: String,
    answer: String,
    difficulty: f64,
    #[serde(default = "default_discrimination")]
    discrimination: f64,
    #[serde(default)]
    tags: Vec<String>,
}

fn default_discrimination() -> f64 {
    1.0
}

/// Parse a single TOML file into an `ItemBank`.
pub fn parse_item_bank(path: &Path) -> Result<ItemBank> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read item bank file: {}", path.display()))?;

    parse_item_bank_str(&content, path)
}

/// Parse a TOML string into an `ItemBank`.
pub fn parse_item_bank_str(content: &str, source_path: &Path) -> Result<ItemBank> {
    let parsed: TomlBankFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let items = parsed
        .items
        .into_iter()
        .map(|i| Item {
            id: i.id,
            statement: i.statement,
            canonical_answer: i.answer,
            difficulty: i.difficulty,
            discrimination: i.discrimination,
            tags: i.tags,
        })
        .collect();

    Ok(ItemBank {
        id: parsed.bank.id,
        name: parsed.bank.name,
        description: parsed.bank.description,
        items,
    })
}

/// Recursively load all `.toml` item banks from a directory.
pub fn load_bank_directory(dir: &Path) -> Result<Vec<ItemBank>> {
    let mut banks = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            banks.extend(load_bank_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_item_bank(&path) {
                Ok(bank) => banks.push(bank),
                Err(e) => {
                    tracing::warn!("skipping {}: {}", path.display(), e);
                }
            }
        }
    }

    banks.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(banks)
}

/// Load one bank file, or every bank under a directory merged into one.
///
/// Item ids must be unique across the resulting catalog.
pub fn load_items(path: &Path) -> Result<Vec<Item>> {
    let banks = if path.is_dir() {
        load_bank_directory(path)?
    } else {
        vec![parse_item_bank(path)?]
    };

    let mut owners: HashMap<ItemId, String> = HashMap::new();
    let mut items = Vec::new();
    for bank in banks {
        for item in bank.items {
            if let Some(owner) = owners.insert(item.id, bank.id.clone()) {
                anyhow::bail!(
                    "duplicate item id {} (in banks '{}' and '{}') under {}",
                    item.id,
                    owner,
                    bank.id,
                    path.display()
                );
            }
            items.push(item);
        }
    }
    Ok(items)
}

/// A warning from item bank validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    /// The item ID (if applicable).
    pub item_id: Option<ItemId>,
    /// Warning message.
    pub message: String,
}

/// Validate an item bank for common calibration and authoring mistakes.
pub fn validate_item_bank(bank: &ItemBank) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    if bank.items.is_empty() {
        warnings.push(ValidationWarning {
            item_id: None,
            message: "bank contains no items".into(),
        });
    }

    let mut seen_ids = HashSet::new();
    for item in &bank.items {
        if !seen_ids.insert(item.id) {
            warnings.push(ValidationWarning {
                item_id: Some(item.id),
                message: format!("duplicate item ID: {}", item.id),
            });
        }
    }

    for item in &bank.items {
        if !item.difficulty.is_finite() || !(THETA_MIN..=THETA_MAX).contains(&item.difficulty) {
            warnings.push(ValidationWarning {
                item_id: Some(item.id),
                message: format!(
                    "difficulty {} outside [{THETA_MIN}, {THETA_MAX}]",
                    item.difficulty
                ),
            });
        }
        if !DISCRIMINATION_RANGE.contains(&item.discrimination) {
            warnings.push(ValidationWarning {
                item_id: Some(item.id),
                message: format!(
                    "discrimination {} outside [{}, {}]",
                    item.discrimination,
                    DISCRIMINATION_RANGE.start(),
                    DISCRIMINATION_RANGE.end()
                ),
            });
        }
    }

    for item in &bank.items {
        if item.statement.trim().is_empty() {
            warnings.push(ValidationWarning {
                item_id: Some(item.id),
                message: "statement is empty".into(),
            });
        }
        if item.canonical_answer.trim().is_empty() {
            warnings.push(ValidationWarning {
                item_id: Some(item.id),
                message: "answer is empty".into(),
            });
        }
    }

    warnings
}
