//! Return and risk statistics over the analysis window, plus pairwise betas.
//!
//! | Key | Terminal field |
//! |-----|----------------|
//! | `period_return` | `pct_chg_per` |
//! | `turnover` | `turn_per` |
//! | `volatility` | `stdevry` |
//! | `sharpe` | `sharpe` |
//! | `calmar` | `risk_calmar` |
//! | `max_drawdown` | `risk_maxdownside2` |
//! | `sharpness` | `risk_maxupside2` |

use serde::{Deserialize, Serialize};

use crate::data_source::{SnapshotRequest, TerminalSource};
use crate::performance::{index_names, round2};
use crate::{AnalysisError, DateRange, InstrumentCode, MetricRow, MetricTable};

pub const RISK_FIELDS: [(&str, &str); 7] = [
    ("period_return", "pct_chg_per"),
    ("turnover", "turn_per"),
    ("volatility", "stdevry"),
    ("sharpe", "sharpe"),
    ("calmar", "risk_calmar"),
    ("max_drawdown", "risk_maxdownside2"),
    ("sharpness", "risk_maxupside2"),
];

/// Window options shared by every risk-style snapshot (annualized, daily).
pub fn risk_window(range: DateRange) -> String {
    format!(
        "startDate={};endDate={};period=2;returnType=1",
        range.start().format_compact(),
        range.end().format_compact()
    )
}

/// `values[i][j]` is the beta of `codes[i]` measured against `codes[j]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetaMatrix {
    pub codes: Vec<InstrumentCode>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl BetaMatrix {
    pub fn get(&self, code: &InstrumentCode, benchmark: &InstrumentCode) -> Option<f64> {
        let row = self.codes.iter().position(|candidate| candidate == code)?;
        let column = self.codes.iter().position(|candidate| candidate == benchmark)?;
        self.values.get(row)?.get(column).copied().flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub range: DateRange,
    pub table: MetricTable,
    pub beta: BetaMatrix,
}

/// Risk table and beta matrix for `codes` over `range`, rounded to two
/// decimals. Missing cells stay empty.
pub async fn risk_table(
    source: &dyn TerminalSource,
    codes: &[InstrumentCode],
    range: DateRange,
) -> Result<RiskReport, AnalysisError> {
    let window = risk_window(range);
    let names = index_names(source, codes).await?;

    let request = SnapshotRequest::new(codes.to_vec(), RISK_FIELDS.map(|(_, field)| field))?
        .with_option(format!("{window};bondPriceType=2;yield=1"));
    let table = source.snapshot(request).await?.into_checked()?;

    let rows = codes
        .iter()
        .map(|code| {
            let mut row = MetricRow::new(code.clone());
            if let Some(name) = names.get(code) {
                row = row.with_label(name.clone());
            }
            for (key, field) in RISK_FIELDS {
                row.set(key, table.number(code, field).map(round2));
            }
            row
        })
        .collect();

    let mut columns = Vec::with_capacity(codes.len());
    for benchmark in codes {
        let request = SnapshotRequest::new(codes.to_vec(), ["beta"])?
            .with_option(format!("{window};index={benchmark}"));
        let table = source.snapshot(request).await?.into_checked()?;
        columns.push(
            codes
                .iter()
                .map(|code| table.number(code, "beta").map(round2))
                .collect::<Vec<_>>(),
        );
    }
    let values = (0..codes.len())
        .map(|row| columns.iter().map(|column| column[row]).collect())
        .collect();

    tracing::debug!(codes = codes.len(), "loaded risk table");
    Ok(RiskReport {
        range,
        table: MetricTable::from_rows(rows),
        beta: BetaMatrix {
            codes: codes.to_vec(),
            values,
        },
    })
}
