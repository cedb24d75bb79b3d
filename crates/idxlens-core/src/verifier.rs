//! Remote confirmation that validated codes denote equity indices.

use serde::{Deserialize, Serialize};

use crate::data_source::{SnapshotRequest, SourceError, TerminalSource};
use crate::InstrumentCode;

/// Security-type field queried for every code.
pub const SECURITY_TYPE_FIELD: &str = "sec_type";
/// Terminal classification field queried for every code.
pub const CLASSIFICATION_FIELD: &str = "windtype";

const INDEX_MARKERS: [&str; 2] = ["指数", "Index"];
const EQUITY_MARKERS: [&str; 3] = ["股票", "A股", "Equity"];

/// Outcome of one verification round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub confirmed: Vec<InstrumentCode>,
    pub rejected: Vec<InstrumentCode>,
    /// Set when the terminal rejected the whole batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl Verification {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.failure.is_none()
    }
}

fn contains_any(value: &str, markers: &[&str]) -> bool {
    markers.iter().any(|marker| value.contains(marker))
}

/// True when both descriptive fields mark an equity index.
pub fn is_equity_index(security_type: Option<&str>, classification: Option<&str>) -> bool {
    match (security_type, classification) {
        (Some(security_type), Some(classification)) => {
            contains_any(security_type, &INDEX_MARKERS)
                && contains_any(classification, &EQUITY_MARKERS)
        }
        _ => false,
    }
}

/// Confirms each code with one snapshot query.
///
/// Empty input returns an empty result without touching the source. A
/// non-zero batch status rejects every code and records the reason; transport
/// failures are returned as errors.
pub async fn verify_codes(
    source: &dyn TerminalSource,
    codes: &[InstrumentCode],
) -> Result<Verification, SourceError> {
    if codes.is_empty() {
        return Ok(Verification::default());
    }

    let request =
        SnapshotRequest::new(codes.to_vec(), [SECURITY_TYPE_FIELD, CLASSIFICATION_FIELD])?;
    let table = source.snapshot(request).await?;

    if !table.is_ok() {
        let reason = format!("terminal rejected the batch with status {}", table.status);
        tracing::warn!(status = table.status, codes = codes.len(), "verification batch failed");
        return Ok(Verification {
            confirmed: Vec::new(),
            rejected: codes.to_vec(),
            failure: Some(reason),
        });
    }

    let (confirmed, rejected): (Vec<_>, Vec<_>) = codes.iter().cloned().partition(|code| {
        is_equity_index(
            table.text(code, SECURITY_TYPE_FIELD),
            table.text(code, CLASSIFICATION_FIELD),
        )
    });

    tracing::info!(
        confirmed = confirmed.len(),
        rejected = rejected.len(),
        "verified index codes"
    );
    Ok(Verification {
        confirmed,
        rejected,
        failure: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_must_both_be_present() {
        assert!(is_equity_index(Some("股票指数"), Some("A股指数")));
        assert!(is_equity_index(Some("Equity Index"), Some("Equity")));
        assert!(!is_equity_index(Some("债券指数"), Some("债券")));
        assert!(!is_equity_index(Some("股票"), Some("股票")));
        assert!(!is_equity_index(None, Some("股票")));
    }
}
