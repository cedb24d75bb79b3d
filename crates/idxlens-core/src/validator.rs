//! Free-text index code validation.
//!
//! Turns whatever the analyst typed into canonical [`InstrumentCode`]s without
//! touching the network. Tokens are classified by ordered rules, first match
//! wins:
//!
//! | Input | Result |
//! |-------|--------|
//! | 6 digits (`000300`) | `000300.SH` |
//! | `H`/`h` + 5 digits (`h30184`) | `H30184.CSI` |
//! | `CN` + 4 digits (`CN1098`) | `CN1098.CNI` |
//! | one of the above + 2-4 letter suffix (`399006.sz`) | uppercased as-is |
//! | anything else | invalid |

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::InstrumentCode;

/// Suffix appended to bare 6-digit codes.
pub const DEFAULT_EXCHANGE_SUFFIX: &str = "SH";
/// Suffix appended to `H`-prefixed codes.
pub const SECONDARY_PROVIDER_SUFFIX: &str = "CSI";
/// Suffix appended to `CN`-prefixed codes.
pub const NATIONAL_PROVIDER_SUFFIX: &str = "CNI";

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,，;；\s]+").expect("separator pattern is valid"));
static SIX_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{6}$").expect("six-digit pattern is valid"));
static H_PREFIXED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[Hh][0-9]{5}$").expect("H-prefixed pattern is valid"));
static CN_PREFIXED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^CN[0-9]{4}$").expect("CN-prefixed pattern is valid"));
static SUFFIXED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[0-9]{6}|[Hh][0-9]{5}|CN[0-9]{4})\.[A-Za-z]{2,4}$")
        .expect("suffixed pattern is valid")
});

/// Partition of input tokens into canonical codes and rejected originals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeValidation {
    pub valid: Vec<InstrumentCode>,
    pub invalid: Vec<String>,
}

impl CodeValidation {
    pub fn is_clean(&self) -> bool {
        self.invalid.is_empty()
    }
}

/// Splits `input` on commas, semicolons (Western or full-width) and whitespace.
pub fn split_tokens(input: &str) -> Vec<&str> {
    SEPARATORS
        .split(input)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect()
}

/// Canonical form of a single token, or `None` when no rule matches.
pub fn canonicalize(token: &str) -> Option<String> {
    if SIX_DIGITS.is_match(token) {
        Some(format!("{token}.{DEFAULT_EXCHANGE_SUFFIX}"))
    } else if H_PREFIXED.is_match(token) {
        Some(format!(
            "{}.{SECONDARY_PROVIDER_SUFFIX}",
            token.to_ascii_uppercase()
        ))
    } else if CN_PREFIXED.is_match(token) {
        Some(format!("{token}.{NATIONAL_PROVIDER_SUFFIX}"))
    } else if SUFFIXED.is_match(token) {
        Some(token.to_ascii_uppercase())
    } else {
        None
    }
}

/// Validates free text into canonical codes, preserving input order.
///
/// Duplicates are kept; empty input yields two empty lists.
pub fn validate_codes(input: &str) -> CodeValidation {
    let mut result = CodeValidation::default();

    for token in split_tokens(input) {
        match canonicalize(token).map(|canonical| InstrumentCode::parse(&canonical)) {
            Some(Ok(code)) => result.valid.push(code),
            _ => result.invalid.push(token.to_owned()),
        }
    }

    tracing::debug!(
        valid = result.valid.len(),
        invalid = result.invalid.len(),
        "validated index codes"
    );
    result
}
