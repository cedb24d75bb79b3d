use idxlens_core::{radar_scores, AppState, DateRange, InstrumentCode};

use crate::error::CliError;

use super::CommandResult;

pub async fn run(
    codes: &[InstrumentCode],
    benchmark: Option<&InstrumentCode>,
    app: &AppState,
    range: DateRange,
) -> Result<CommandResult, CliError> {
    let report = radar_scores(app.source(), codes, benchmark, range).await?;
    let warnings = report.warnings.clone();

    Ok(CommandResult::ok(serde_json::to_value(report)?).with_warnings(warnings))
}
