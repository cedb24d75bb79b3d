//! Reported revenue and net profit, followed by consensus forecasts.
//!
//! Five reported fiscal years end at the latest year with a published annual
//! report; three forecast years follow. Values are in units of 1e8 CNY.

use serde::{Deserialize, Serialize};

use crate::data_source::{FieldTable, SnapshotRequest, TerminalSource};
use crate::performance::index_names;
use crate::{AnalysisError, InstrumentCode, IsoDate, MetricRow, MetricTable};

pub const REPORTED_YEARS: i32 = 5;
pub const FORECAST_YEARS: i32 = 3;

const YUAN_PER_UNIT: f64 = 1e8;
const REVENUE_FIELD: &str = "oper_rev";
const PROFIT_FIELD: &str = "np_belongto_parcomsh";
const EST_REVENUE_FIELD: &str = "est_sales";
const EST_PROFIT_FIELD: &str = "est_netprofit";

/// One fiscal-year column; forecasts are keyed `<year>E`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsPeriod {
    pub key: String,
    pub year: i32,
    pub estimate: bool,
}

impl EarningsPeriod {
    fn reported(year: i32) -> Self {
        Self {
            key: year.to_string(),
            year,
            estimate: false,
        }
    }

    fn forecast(year: i32) -> Self {
        Self {
            key: format!("{year}E"),
            year,
            estimate: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsReport {
    pub periods: Vec<EarningsPeriod>,
    pub revenue: MetricTable,
    pub net_profit: MetricTable,
}

/// Fiscal-year columns given the latest reported year.
pub fn earnings_periods(latest_reported: i32) -> Vec<EarningsPeriod> {
    let reported = (latest_reported - REPORTED_YEARS + 1..=latest_reported).map(EarningsPeriod::reported);
    let forecast =
        (latest_reported + 1..=latest_reported + FORECAST_YEARS).map(EarningsPeriod::forecast);
    reported.chain(forecast).collect()
}

async fn snapshot(
    source: &dyn TerminalSource,
    codes: &[InstrumentCode],
    fields: [&str; 2],
    options: String,
) -> Result<FieldTable, AnalysisError> {
    let request = SnapshotRequest::new(codes.to_vec(), fields)?.with_option(options);
    Ok(source.snapshot(request).await?.into_checked()?)
}

fn forecast_options(year: i32, end: IsoDate) -> String {
    format!("unit=1;year={year};tradeDate={}", end.format_compact())
}

/// Revenue and net profit per fiscal year as of `end`.
///
/// Last year's annual report counts as published once no index carries a
/// consensus forecast for that year any more.
pub async fn earnings(
    source: &dyn TerminalSource,
    codes: &[InstrumentCode],
    end: IsoDate,
) -> Result<EarningsReport, AnalysisError> {
    let last_year = end.year() - 1;
    let pending = snapshot(
        source,
        codes,
        [EST_REVENUE_FIELD, EST_PROFIT_FIELD],
        forecast_options(last_year, end),
    )
    .await?;
    let published = codes
        .iter()
        .all(|code| pending.number(code, EST_PROFIT_FIELD).is_none());
    let latest_reported = if published { last_year } else { last_year - 1 };
    tracing::debug!(latest_reported, "resolved latest annual report");

    let names = index_names(source, codes).await?;
    let blank_rows = || -> Vec<MetricRow> {
        codes
            .iter()
            .map(|code| match names.get(code) {
                Some(name) => MetricRow::new(code.clone()).with_label(name.clone()),
                None => MetricRow::new(code.clone()),
            })
            .collect()
    };
    let mut revenue = blank_rows();
    let mut profit = blank_rows();

    let periods = earnings_periods(latest_reported);
    for period in &periods {
        let (fields, options) = if period.estimate {
            (
                [EST_REVENUE_FIELD, EST_PROFIT_FIELD],
                forecast_options(period.year, end),
            )
        } else {
            (
                [REVENUE_FIELD, PROFIT_FIELD],
                format!("unit=1;rptDate={}1231;rptType=1", period.year),
            )
        };
        let table = snapshot(source, codes, fields, options).await?;
        for (revenue_row, profit_row) in revenue.iter_mut().zip(profit.iter_mut()) {
            let code = revenue_row.code.clone();
            revenue_row.set(&period.key, table.number(&code, fields[0]).map(|v| v / YUAN_PER_UNIT));
            profit_row.set(&period.key, table.number(&code, fields[1]).map(|v| v / YUAN_PER_UNIT));
        }
    }

    Ok(EarningsReport {
        periods,
        revenue: MetricTable::from_rows(revenue),
        net_profit: MetricTable::from_rows(profit),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_reported_years_precede_three_forecasts() {
        let periods = earnings_periods(2023);
        let keys: Vec<&str> = periods.iter().map(|period| period.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["2019", "2020", "2021", "2022", "2023", "2024E", "2025E", "2026E"]
        );
        assert_eq!(periods.iter().filter(|period| period.estimate).count(), 3);
    }
}
