use thiserror::Error;

use crate::data_source::SourceError;

/// Validation and contract errors exposed by `idxlens-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("instrument code cannot be empty")]
    EmptyCode,
    #[error("instrument code '{value}' must look like BASE.SUFFIX")]
    InvalidCode { value: String },

    #[error("date must be YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },
    #[error("start date {start} is after end date {end}")]
    InvertedDateRange { start: String, end: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: String },

    #[error("at most {max} codes can be analysed at once, got {count}")]
    TooManyCodes { count: usize, max: usize },

    #[error("invalid industry scheme '{value}', expected one of sw, citic")]
    InvalidIndustryScheme { value: String },
    #[error("industry level must be 1, 2 or 3, got {value}")]
    InvalidIndustryLevel { value: u8 },

    #[error("invalid source '{value}', expected one of gateway, fixture")]
    InvalidSource { value: String },

    #[error("request_id must be at least 8 characters")]
    InvalidRequestId,
    #[error("schema_version must match vMAJOR.MINOR.PATCH: '{value}'")]
    InvalidSchemaVersion { value: String },
    #[error("error code cannot be empty")]
    EmptyErrorCode,
    #[error("error message cannot be empty")]
    EmptyErrorMessage,
}

/// Regression preconditions that were not met.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FittingError {
    #[error("regression needs at least 2 observations, got {rows}")]
    TooFewRows { rows: usize },
    #[error("x and y lengths differ ({x} vs {y})")]
    LengthMismatch { x: usize, y: usize },
    #[error("observation {index} is not finite")]
    NonFinite { index: usize },
    #[error("'{field}' has zero variance")]
    ZeroVariance { field: String },
    #[error("unknown variable '{field}'")]
    UnknownVariable { field: String },
}

/// Failures while reading an uploaded code file.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("unsupported file format '{extension}', upload a .csv, .tsv, .txt, .xlsx, .xls or .ods file")]
    UnsupportedFormat { extension: String },
    #[error("could not read spreadsheet: {message}")]
    Spreadsheet { message: String },
    #[error("file is missing the required column: {expected}")]
    MissingColumn { expected: String },
    #[error("malformed record at line {line}: {message}")]
    MalformedRecord { line: u64, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Request-level failures of the analysis pipeline.
///
/// Row-level problems (a single missing field) are not errors: the row is
/// dropped and a warning is attached instead. `DataUnavailable` is raised only
/// when nothing usable remains.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid code format: {}", .tokens.join(", "))]
    Format { tokens: Vec<String> },

    #[error("enter at least one index code")]
    NoCodes,

    #[error("{}", describe_rejection(.codes, .reason.as_deref()))]
    Verification {
        codes: Vec<String>,
        reason: Option<String>,
    },

    #[error("no usable data: {reason}")]
    DataUnavailable { reason: String },

    #[error(transparent)]
    Fitting(#[from] FittingError),

    #[error("terminal connection error: {0}")]
    Connection(#[from] SourceError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}

fn describe_rejection(codes: &[String], reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!("verification failed: {reason}"),
        None => format!("not valid equity index codes: {}", codes.join(", ")),
    }
}

impl AnalysisError {
    pub fn data_unavailable(reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            reason: reason.into(),
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::Format { .. } => "analysis.format",
            Self::NoCodes => "analysis.no_codes",
            Self::Verification { .. } => "analysis.verification",
            Self::DataUnavailable { .. } => "analysis.data_unavailable",
            Self::Fitting(_) => "analysis.fitting",
            Self::Connection(_) => "analysis.connection",
            Self::Validation(_) => "analysis.validation",
            Self::Upload(_) => "analysis.upload",
        }
    }
}

/// Top-level error type for core operations that are not part of the pipeline.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
