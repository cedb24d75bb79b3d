use idxlens_core::{read_code_file, AppState, DateRange, FormSubmission, SessionState};

use crate::cli::VerifyArgs;
use crate::error::CliError;

use super::CommandResult;

pub async fn run(
    args: &VerifyArgs,
    app: &AppState,
    range: DateRange,
) -> Result<CommandResult, CliError> {
    let form = match &args.file {
        Some(path) => FormSubmission::upload(read_code_file(path)?, range),
        None => FormSubmission::text(args.input.join(" "), range),
    };

    let mut session = SessionState::new();
    session.submit(form, app).await?;

    Ok(CommandResult::ok(serde_json::to_value(session)?))
}
