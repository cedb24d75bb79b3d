use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_BASE_LEN: usize = 12;
const MIN_SUFFIX_LEN: usize = 2;
const MAX_SUFFIX_LEN: usize = 4;

/// Canonical instrument identifier in `BASE.SUFFIX` form, uppercase.
///
/// This type only enforces the general shape. The stricter index-code rules
/// (6 digits, `H` + 5 digits, `CN` + 4 digits) live in
/// [`validate_codes`](crate::validator::validate_codes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstrumentCode(String);

impl InstrumentCode {
    /// Parse and normalize a code to uppercase.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyCode);
        }

        let normalized = trimmed.to_ascii_uppercase();
        let invalid = || ValidationError::InvalidCode {
            value: trimmed.to_owned(),
        };

        let (base, suffix) = normalized.split_once('.').ok_or_else(invalid)?;

        if base.is_empty()
            || base.len() > MAX_BASE_LEN
            || !base.chars().all(|ch| ch.is_ascii_alphanumeric())
        {
            return Err(invalid());
        }

        if !(MIN_SUFFIX_LEN..=MAX_SUFFIX_LEN).contains(&suffix.len())
            || !suffix.chars().all(|ch| ch.is_ascii_alphabetic())
        {
            return Err(invalid());
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn base(&self) -> &str {
        self.0.split_once('.').map_or(self.0.as_str(), |(base, _)| base)
    }

    pub fn suffix(&self) -> &str {
        self.0.split_once('.').map_or("", |(_, suffix)| suffix)
    }
}

impl Display for InstrumentCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for InstrumentCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for InstrumentCode {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<InstrumentCode> for String {
    fn from(value: InstrumentCode) -> Self {
        value.0
    }
}

/// Joins codes with commas, the list syntax the terminal expects.
pub fn join_codes(codes: &[InstrumentCode]) -> String {
    codes
        .iter()
        .map(InstrumentCode::as_str)
        .collect::<Vec<_>>()
        .join(",")
}
