//! Descriptive profile of each index: name, dates, publisher, exchange.

use serde::{Deserialize, Serialize};

use crate::data_source::{FieldTable, SnapshotRequest, TerminalSource};
use crate::{AnalysisError, InstrumentCode, IsoDate};

const PROFILE_FIELDS: [&str; 8] = [
    "sec_name",
    "basedate",
    "launchdate",
    "repo_briefing",
    "numberofconstituents",
    "officialstyle",
    "crm_issuer",
    "exchange_cn",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexProfile {
    pub code: InstrumentCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_date: Option<IsoDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_date: Option<IsoDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub briefing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constituents: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
}

impl IndexProfile {
    fn from_table(table: &FieldTable, code: &InstrumentCode) -> Self {
        let text = |field: &str| table.text(code, field).map(|value| value.trim().to_owned());
        Self {
            code: code.clone(),
            name: text("sec_name"),
            base_date: table.text(code, "basedate").and_then(date_cell),
            launch_date: table.text(code, "launchdate").and_then(date_cell),
            briefing: text("repo_briefing"),
            constituents: table
                .number(code, "numberofconstituents")
                .filter(|count| *count >= 0.0)
                .map(|count| count.round() as u32),
            style: text("officialstyle"),
            publisher: text("crm_issuer"),
            exchange: text("exchange_cn"),
        }
    }
}

/// Terminal dates arrive as `YYYY-MM-DD` with an optional time part.
fn date_cell(raw: &str) -> Option<IsoDate> {
    let raw = raw.trim();
    IsoDate::parse(raw.get(..10).unwrap_or(raw)).ok()
}

/// One profile per code, in input order. Unknown fields stay empty.
pub async fn index_profiles(
    source: &dyn TerminalSource,
    codes: &[InstrumentCode],
) -> Result<Vec<IndexProfile>, AnalysisError> {
    let request = SnapshotRequest::new(codes.to_vec(), PROFILE_FIELDS)?;
    let table = source.snapshot(request).await?.into_checked()?;
    Ok(codes
        .iter()
        .map(|code| IndexProfile::from_table(&table, code))
        .collect())
}
