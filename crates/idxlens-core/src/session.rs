//! Per-session form state and the submission handler.

use serde::{Deserialize, Serialize};

use crate::upload::UploadedFile;
use crate::verifier::verify_codes;
use crate::{validate_codes, AnalysisError, AppState, DateRange, InstrumentCode, ValidationError};

/// What the analyst submitted: free-text codes, a date range and an optional
/// uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormSubmission {
    pub text: String,
    pub range: DateRange,
    pub upload: Option<UploadedFile>,
}

impl FormSubmission {
    pub fn text(text: impl Into<String>, range: DateRange) -> Self {
        Self {
            text: text.into(),
            range,
            upload: None,
        }
    }

    pub fn upload(file: UploadedFile, range: DateRange) -> Self {
        Self {
            text: String::new(),
            range,
            upload: Some(file),
        }
    }
}

/// Session state, mutated only by [`SessionState::submit`]. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub codes: Vec<InstrumentCode>,
    pub range: DateRange,
    pub error: Option<String>,
    pub upload: Option<UploadedFile>,
    pub ready: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles one form submission.
    ///
    /// On failure the message is also stored in `error` and analysis stays
    /// blocked; previously accepted codes are left untouched.
    pub async fn submit(
        &mut self,
        form: FormSubmission,
        app: &AppState,
    ) -> Result<(), AnalysisError> {
        self.error = None;

        if let Some(file) = form.upload {
            tracing::info!(codes = file.codes.len(), "accepted uploaded code file");
            self.upload = Some(file);
            self.codes.clear();
            self.range = form.range;
            self.ready = true;
            return Ok(());
        }

        match self.accept_text(&form.text, app).await {
            Ok(codes) => {
                self.codes = codes;
                self.range = form.range;
                self.upload = None;
                self.ready = true;
                Ok(())
            }
            Err(error) => {
                tracing::warn!(code = error.code(), "form submission rejected");
                self.error = Some(error.to_string());
                self.ready = false;
                Err(error)
            }
        }
    }

    async fn accept_text(
        &self,
        text: &str,
        app: &AppState,
    ) -> Result<Vec<InstrumentCode>, AnalysisError> {
        let validation = validate_codes(text);
        if !validation.is_clean() {
            return Err(AnalysisError::Format {
                tokens: validation.invalid,
            });
        }
        if validation.valid.is_empty() {
            return Err(AnalysisError::NoCodes);
        }

        let verification = verify_codes(app.source(), &validation.valid).await?;
        if !verification.is_clean() {
            return Err(AnalysisError::Verification {
                codes: verification
                    .rejected
                    .iter()
                    .map(|code| code.as_str().to_owned())
                    .collect(),
                reason: verification.failure,
            });
        }

        let max = app.config().max_codes;
        if verification.confirmed.len() > max {
            return Err(ValidationError::TooManyCodes {
                count: verification.confirmed.len(),
                max,
            }
            .into());
        }

        Ok(verification.confirmed)
    }
}
