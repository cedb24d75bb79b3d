use idxlens_core::{composition, AppState, DateRange, IndustryLevel, IndustryScheme, InstrumentCode};

use crate::cli::CompositionArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(
    codes: &[InstrumentCode],
    args: &CompositionArgs,
    app: &AppState,
    range: DateRange,
) -> Result<CommandResult, CliError> {
    let scheme: IndustryScheme = args.scheme.parse()?;
    let level = IndustryLevel::new(args.level)?;

    let report = composition(app.source(), codes, range.end(), scheme, level).await?;
    let warnings = report.warnings.clone();

    Ok(CommandResult::ok(serde_json::to_value(report)?).with_warnings(warnings))
}
