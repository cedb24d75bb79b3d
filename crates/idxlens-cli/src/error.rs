use idxlens_core::{AnalysisError, CoreError, UploadError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] idxlens_core::ValidationError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<UploadError> for CliError {
    fn from(error: UploadError) -> Self {
        Self::Analysis(error.into())
    }
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) => 2,
            Self::Analysis(error) => match error {
                AnalysisError::Format { .. }
                | AnalysisError::NoCodes
                | AnalysisError::Validation(_)
                | AnalysisError::Fitting(_) => 2,
                AnalysisError::Upload(UploadError::Io(_)) => 10,
                AnalysisError::Upload(_) => 2,
                AnalysisError::Verification { .. } => 3,
                AnalysisError::Connection(_) => 6,
                AnalysisError::DataUnavailable { .. } => 10,
            },
            Self::Core(CoreError::Validation(_)) => 2,
            Self::Core(CoreError::Serialization(_)) | Self::Serialization(_) => 4,
            Self::Core(_) | Self::Io(_) => 10,
        }
    }
}
