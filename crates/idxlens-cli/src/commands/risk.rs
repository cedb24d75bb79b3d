use idxlens_core::{risk_table, AppState, DateRange, InstrumentCode};

use crate::error::CliError;

use super::CommandResult;

pub async fn run(
    codes: &[InstrumentCode],
    app: &AppState,
    range: DateRange,
) -> Result<CommandResult, CliError> {
    let report = risk_table(app.source(), codes, range).await?;
    Ok(CommandResult::ok(serde_json::to_value(report)?))
}
