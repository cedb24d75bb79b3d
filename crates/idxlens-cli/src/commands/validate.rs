use idxlens_core::validate_codes;

use crate::cli::CodesArgs;
use crate::error::CliError;

use super::CommandResult;

pub fn run(args: &CodesArgs) -> Result<CommandResult, CliError> {
    let validation = validate_codes(&args.text());
    let warnings = if validation.is_clean() {
        Vec::new()
    } else {
        vec![format!("invalid code format: {}", validation.invalid.join(", "))]
    };

    Ok(CommandResult::ok(serde_json::to_value(validation)?).with_warnings(warnings))
}
