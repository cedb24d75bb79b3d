use idxlens_core::performance::{ReturnCurve, YearlyReturns};
use idxlens_core::{
    cumulative_returns, valuation_percentiles, yearly_returns, AppState, DateRange,
    InstrumentCode, MetricTable,
};
use serde::Serialize;

use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct ReturnsResponseData {
    yearly: YearlyReturns,
    valuation: MetricTable,
    cumulative: Vec<ReturnCurve>,
}

pub async fn run(
    codes: &[InstrumentCode],
    app: &AppState,
    range: DateRange,
) -> Result<CommandResult, CliError> {
    let source = app.source();
    let data = ReturnsResponseData {
        yearly: yearly_returns(source, codes, range.end()).await?,
        valuation: valuation_percentiles(source, codes, range).await?,
        cumulative: cumulative_returns(source, codes, range).await?,
    };

    let warnings = data
        .cumulative
        .iter()
        .filter(|curve| curve.points.is_empty())
        .map(|curve| format!("{}: no close prices in range", curve.code))
        .collect();

    Ok(CommandResult::ok(serde_json::to_value(data)?).with_warnings(warnings))
}
