use idxlens_core::{earnings, AppState, DateRange, InstrumentCode};

use crate::error::CliError;

use super::CommandResult;

pub async fn run(
    codes: &[InstrumentCode],
    app: &AppState,
    range: DateRange,
) -> Result<CommandResult, CliError> {
    let report = earnings(app.source(), codes, range.end()).await?;
    Ok(CommandResult::ok(serde_json::to_value(report)?))
}
