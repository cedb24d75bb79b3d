use idxlens_core::{index_profiles, AppState, InstrumentCode};

use crate::error::CliError;

use super::CommandResult;

pub async fn run(codes: &[InstrumentCode], app: &AppState) -> Result<CommandResult, CliError> {
    let profiles = index_profiles(app.source(), codes).await?;
    let warnings = profiles
        .iter()
        .filter(|profile| profile.name.is_none())
        .map(|profile| format!("{}: no profile data", profile.code))
        .collect();

    Ok(CommandResult::ok(serde_json::to_value(profiles)?).with_warnings(warnings))
}
