//! Return and valuation tables for the selected indices.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data_source::{SeriesRequest, SnapshotRequest, TerminalSource};
use crate::{AnalysisError, DateRange, InstrumentCode, IsoDate, MetricRow, MetricTable};

/// Calendar years reported before the end date's year.
pub const PRIOR_YEARS: i32 = 4;

pub mod fields {
    pub const PE_PERCENTILE: &str = "pe_percentile";
    pub const PB_PERCENTILE: &str = "pb_percentile";
}

const PE_FIELD: &str = "pe_ttm";
const PB_FIELD: &str = "pb_lf";

/// Display names keyed by code; codes without a name are absent.
pub async fn index_names(
    source: &dyn TerminalSource,
    codes: &[InstrumentCode],
) -> Result<BTreeMap<InstrumentCode, String>, AnalysisError> {
    let request = SnapshotRequest::new(codes.to_vec(), ["sec_name"])?;
    let table = source.snapshot(request).await?.into_checked()?;
    Ok(codes
        .iter()
        .filter_map(|code| Some((code.clone(), table.text(code, "sec_name")?.to_owned())))
        .collect())
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Per-period returns; `periods` lists the column keys in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyReturns {
    pub periods: Vec<String>,
    pub table: MetricTable,
}

/// Returns (percent, 2 decimals) for the four calendar years before the end
/// date's year and for the current year to date. Missing cells stay empty.
pub async fn yearly_returns(
    source: &dyn TerminalSource,
    codes: &[InstrumentCode],
    end: IsoDate,
) -> Result<YearlyReturns, AnalysisError> {
    let current = end.year();
    let mut windows: Vec<(String, String)> = ((current - PRIOR_YEARS)..current)
        .map(|year| (year.to_string(), format!("startDate={year}0101;endDate={year}1231")))
        .collect();
    windows.push((
        format!("{current} YTD"),
        format!("startDate={current}0101;endDate={}", end.format_compact()),
    ));

    let names = index_names(source, codes).await?;
    let mut rows: Vec<MetricRow> = codes
        .iter()
        .map(|code| {
            let row = MetricRow::new(code.clone());
            match names.get(code) {
                Some(name) => row.with_label(name.clone()),
                None => row,
            }
        })
        .collect();

    for (period, options) in &windows {
        let request = SnapshotRequest::new(codes.to_vec(), ["pct_chg_per"])?.with_option(options);
        let table = source.snapshot(request).await?.into_checked()?;
        for row in &mut rows {
            let value = table.number(&row.code, "pct_chg_per").map(round2);
            row.set(period, value);
        }
    }

    Ok(YearlyReturns {
        periods: windows.into_iter().map(|(period, _)| period).collect(),
        table: MetricTable::from_rows(rows),
    })
}

/// Cumulative return path of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnCurve {
    pub code: InstrumentCode,
    /// `(date, (p / p0 - 1) · 100)`, anchored at the first available price.
    pub points: Vec<(IsoDate, f64)>,
}

/// Cumulative percent return from `(date, price)` observations.
pub fn cumulative_curve(prices: &[(IsoDate, f64)]) -> Vec<(IsoDate, f64)> {
    let Some(base) = prices.iter().map(|(_, p)| *p).find(|p| *p != 0.0) else {
        return Vec::new();
    };
    prices
        .iter()
        .skip_while(|(_, p)| *p != base)
        .map(|(date, p)| (*date, (p / base - 1.0) * 100.0))
        .collect()
}

pub async fn cumulative_returns(
    source: &dyn TerminalSource,
    codes: &[InstrumentCode],
    range: DateRange,
) -> Result<Vec<ReturnCurve>, AnalysisError> {
    let request = SeriesRequest::new(codes.to_vec(), "close", range)?;
    let table = source.series(request).await?.into_checked()?;
    Ok(codes
        .iter()
        .map(|code| ReturnCurve {
            code: code.clone(),
            points: cumulative_curve(&table.observations(code)),
        })
        .collect())
}

/// P/E and P/B percentiles over `range`, as of its end date.
pub async fn valuation_percentiles(
    source: &dyn TerminalSource,
    codes: &[InstrumentCode],
    range: DateRange,
) -> Result<MetricTable, AnalysisError> {
    let end = range.end().format_compact();
    let request = SnapshotRequest::new(codes.to_vec(), ["val_pe_percentile", "val_pb_percentile"])?
        .with_option(format!(
            "tradeDate={end};startDate={};endDate={end}",
            range.start().format_compact()
        ));
    let table = source.snapshot(request).await?.into_checked()?;

    Ok(MetricTable::from_rows(
        codes
            .iter()
            .map(|code| {
                let mut row = MetricRow::new(code.clone());
                row.set(fields::PE_PERCENTILE, table.number(code, "val_pe_percentile"));
                row.set(fields::PB_PERCENTILE, table.number(code, "val_pb_percentile"));
                row
            })
            .collect(),
    ))
}

/// Daily valuation multiple of one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationSeries {
    pub code: InstrumentCode,
    pub points: Vec<(IsoDate, f64)>,
}

impl ValuationSeries {
    pub fn latest(&self) -> Option<f64> {
        self.points.last().map(|(_, value)| *value)
    }
}

/// Trailing P/E and latest-filing P/B over the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationHistory {
    pub pe_ttm: Vec<ValuationSeries>,
    pub pb_lf: Vec<ValuationSeries>,
}

async fn valuation_series(
    source: &dyn TerminalSource,
    codes: &[InstrumentCode],
    field: &str,
    range: DateRange,
) -> Result<Vec<ValuationSeries>, AnalysisError> {
    let request = SeriesRequest::new(codes.to_vec(), field, range)?;
    let table = source.series(request).await?.into_checked()?;
    Ok(codes
        .iter()
        .map(|code| ValuationSeries {
            code: code.clone(),
            points: table.observations(code),
        })
        .collect())
}

/// P/E (TTM) and P/B (LF) daily series for each code; gaps are skipped.
pub async fn valuation_history(
    source: &dyn TerminalSource,
    codes: &[InstrumentCode],
    range: DateRange,
) -> Result<ValuationHistory, AnalysisError> {
    Ok(ValuationHistory {
        pe_ttm: valuation_series(source, codes, PE_FIELD, range).await?,
        pb_lf: valuation_series(source, codes, PB_FIELD, range).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(raw: &str) -> IsoDate {
        IsoDate::parse(raw).expect("valid date")
    }

    #[test]
    fn curve_is_anchored_at_first_price() {
        let curve = cumulative_curve(&[
            (date("2024-01-02"), 100.0),
            (date("2024-01-03"), 110.0),
            (date("2024-01-04"), 90.0),
        ]);
        assert_eq!(curve[0].1, 0.0);
        assert!((curve[1].1 - 10.0).abs() < 1e-9);
        assert!((curve[2].1 + 10.0).abs() < 1e-9);
    }

    #[test]
    fn leading_zero_prices_are_skipped() {
        let curve = cumulative_curve(&[(date("2024-01-02"), 0.0), (date("2024-01-03"), 50.0)]);
        assert_eq!(curve, vec![(date("2024-01-03"), 0.0)]);
    }

    #[test]
    fn rounding_keeps_two_decimals() {
        assert_eq!(round2(12.3456), 12.35);
        assert_eq!(round2(-0.004), -0.0);
    }
}
