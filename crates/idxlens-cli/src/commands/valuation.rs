use idxlens_core::performance::ValuationHistory;
use idxlens_core::{
    valuation_history, valuation_percentiles, AppState, DateRange, InstrumentCode, MetricTable,
};
use serde::Serialize;

use crate::error::CliError;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct ValuationResponseData {
    percentiles: MetricTable,
    history: ValuationHistory,
}

pub async fn run(
    codes: &[InstrumentCode],
    app: &AppState,
    range: DateRange,
) -> Result<CommandResult, CliError> {
    let source = app.source();
    let data = ValuationResponseData {
        percentiles: valuation_percentiles(source, codes, range).await?,
        history: valuation_history(source, codes, range).await?,
    };

    let warnings = data
        .history
        .pe_ttm
        .iter()
        .chain(&data.history.pb_lf)
        .filter(|series| series.points.is_empty())
        .map(|series| format!("{}: no valuation history in range", series.code))
        .collect();

    Ok(CommandResult::ok(serde_json::to_value(data)?).with_warnings(warnings))
}
