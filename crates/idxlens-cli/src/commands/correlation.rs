use idxlens_core::{correlation_matrix, AppState, DateRange, InstrumentCode};

use crate::error::CliError;

use super::CommandResult;

pub async fn run(
    codes: &[InstrumentCode],
    app: &AppState,
    range: DateRange,
) -> Result<CommandResult, CliError> {
    let matrix = correlation_matrix(app.source(), codes, range).await?;
    Ok(CommandResult::ok(serde_json::to_value(matrix)?))
}
