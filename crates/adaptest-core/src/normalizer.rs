//! Free-text answer normalization and grading.
//!
//! Answers are compared as strings after canonicalization, so `2X + 1` and
//! `2x+1` grade the same. Decimal separators are left as typed: `17,5` may be
//! a decimal number or a coordinate pair depending on the item.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static OPERATOR_SPACING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*([+\-=*/])\s*").expect("valid operator pattern"));

static OPEN_PAREN_SPACING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*").expect("valid paren pattern"));

static CLOSE_PAREN_SPACING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\)").expect("valid paren pattern"));

static SQUARED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*(?:\*\*2|\^2|\bal[\s_]*cuadrado\b|\bsquared\b)").expect("valid power pattern")
});

/// Outcome of grading one answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub is_correct: bool,
    /// 1.0 when correct, 0.0 otherwise. No partial credit.
    pub score: f64,
}

/// Canonicalize a mathematical answer for equality comparison.
///
/// Applied in order:
/// 1. trim and lowercase
/// 2. drop whitespace around `+ - = * /`
/// 3. drop whitespace just inside parentheses
/// 4. rewrite `**2`, `^2`, "al cuadrado" and "squared" as `^2`
pub fn normalize(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let compact = OPERATOR_SPACING.replace_all(&lowered, "$1");
    let compact = OPEN_PAREN_SPACING.replace_all(&compact, "(");
    let compact = CLOSE_PAREN_SPACING.replace_all(&compact, ")");
    SQUARED.replace_all(&compact, "^2").into_owned()
}

/// Grade `given` against `canonical`.
pub fn evaluate(given: &str, canonical: &str) -> Evaluation {
    let is_correct = normalize(given) == normalize(canonical);
    Evaluation {
        is_correct,
        score: if is_correct { 1.0 } else { 0.0 },
    }
}
