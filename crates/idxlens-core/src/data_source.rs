//! Terminal source trait and request/response types.
//!
//! The market-data terminal answers three query shapes. This module defines
//! the adapter contract ([`TerminalSource`]) every implementation follows,
//! together with the request and response types for each shape.
//!
//! | Endpoint | Request | Response | Description |
//! |----------|---------|----------|-------------|
//! | Snapshot | [`SnapshotRequest`] | [`FieldTable`] | Fields per code at a point or over a window |
//! | Series | [`SeriesRequest`] | [`SeriesTable`] | Daily values of one field per code |
//! | Dataset | [`DatasetRequest`] | [`Dataset`] | Named report (constituents, tracking funds) |
//!
//! Cells the terminal cannot fill come back as `null`. Every response also
//! carries the terminal's batch status code; anything other than `0` means the
//! whole batch is unusable.
//!
//! # Example
//!
//! ```rust,ignore
//! use idxlens_core::{FixtureSource, InstrumentCode, SnapshotRequest, TerminalSource};
//!
//! async fn names(source: &FixtureSource) -> Result<(), idxlens_core::SourceError> {
//!     let code = InstrumentCode::parse("000300.SH")?;
//!     let request = SnapshotRequest::new(vec![code.clone()], ["sec_name"])?;
//!     let table = source.snapshot(request).await?.into_checked()?;
//!     println!("{:?}", table.text(&code, "sec_name"));
//!     Ok(())
//! }
//! ```

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{join_codes, DateRange, InstrumentCode, IsoDate, SourceId, ValidationError};

/// Query shape, used for cache keys and gateway paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Snapshot,
    Series,
    Dataset,
}

impl Endpoint {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Series => "series",
            Self::Dataset => "dataset",
        }
    }

    /// Terminal function name behind each shape.
    pub const fn function(self) -> &'static str {
        match self {
            Self::Snapshot => "wss",
            Self::Series => "wsd",
            Self::Dataset => "wset",
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Unavailable,
    RateLimited,
    InvalidRequest,
    BatchFailed,
    Internal,
}

/// Structured source error. Nothing in idxlens retries; `retryable` only tells
/// the user whether resubmitting may help.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::RateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn batch_failed(endpoint: Endpoint, status: i64) -> Self {
        Self {
            kind: SourceErrorKind::BatchFailed,
            message: format!("terminal {endpoint} query failed with status {status}"),
            retryable: false,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::RateLimited => "source.rate_limited",
            SourceErrorKind::InvalidRequest => "source.invalid_request",
            SourceErrorKind::BatchFailed => "source.batch_failed",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

impl From<ValidationError> for SourceError {
    fn from(value: ValidationError) -> Self {
        Self::invalid_request(value.to_string())
    }
}

fn normalize_field(field: &str) -> String {
    field.trim().to_ascii_lowercase()
}

fn collect_fields<I, S>(fields: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fields
        .into_iter()
        .map(|field| normalize_field(field.as_ref()))
        .filter(|field| !field.is_empty())
        .collect()
}

/// Request payload for snapshot queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotRequest {
    pub codes: Vec<InstrumentCode>,
    pub fields: Vec<String>,
    pub options: Vec<String>,
}

impl SnapshotRequest {
    pub fn new<I, S>(codes: Vec<InstrumentCode>, fields: I) -> Result<Self, SourceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if codes.is_empty() {
            return Err(SourceError::invalid_request(
                "snapshot request must include at least one code",
            ));
        }
        let fields = collect_fields(fields);
        if fields.is_empty() {
            return Err(SourceError::invalid_request(
                "snapshot request must include at least one field",
            ));
        }
        Ok(Self {
            codes,
            fields,
            options: Vec::new(),
        })
    }

    /// Appends a `key=value` option; empty options are ignored.
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        let option = option.into();
        if !option.trim().is_empty() {
            self.options.push(option);
        }
        self
    }

    /// Canonical argument string, identical for identical queries.
    pub fn cache_args(&self) -> String {
        format!(
            "{}|{}|{}",
            join_codes(&self.codes),
            self.fields.join(","),
            self.options.join(";")
        )
    }
}

/// Request payload for daily series queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesRequest {
    pub codes: Vec<InstrumentCode>,
    pub field: String,
    pub range: DateRange,
    pub options: Vec<String>,
}

impl SeriesRequest {
    pub fn new(
        codes: Vec<InstrumentCode>,
        field: impl AsRef<str>,
        range: DateRange,
    ) -> Result<Self, SourceError> {
        if codes.is_empty() {
            return Err(SourceError::invalid_request(
                "series request must include at least one code",
            ));
        }
        let field = normalize_field(field.as_ref());
        if field.is_empty() {
            return Err(SourceError::invalid_request(
                "series request must name a field",
            ));
        }
        Ok(Self {
            codes,
            field,
            range,
            options: Vec::new(),
        })
    }

    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        let option = option.into();
        if !option.trim().is_empty() {
            self.options.push(option);
        }
        self
    }

    pub fn cache_args(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            join_codes(&self.codes),
            self.field,
            self.range.start(),
            self.range.end(),
            self.options.join(";")
        )
    }
}

/// Request payload for named dataset queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetRequest {
    pub name: String,
    pub options: Vec<String>,
}

impl DatasetRequest {
    pub fn new(name: impl AsRef<str>) -> Result<Self, SourceError> {
        let name = normalize_field(name.as_ref());
        if name.is_empty() {
            return Err(SourceError::invalid_request(
                "dataset request must name a dataset",
            ));
        }
        Ok(Self {
            name,
            options: Vec::new(),
        })
    }

    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        let option = option.into();
        if !option.trim().is_empty() {
            self.options.push(option);
        }
        self
    }

    pub fn cache_args(&self) -> String {
        format!("{}|{}", self.name, self.options.join(";"))
    }
}

/// Reads a JSON cell as a finite number.
pub fn cell_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Reads a JSON cell as a non-empty string.
pub fn cell_text(value: &Value) -> Option<&str> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.as_str()),
        _ => None,
    }
}

/// Snapshot response: one row per code, one cell per field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldTable {
    pub status: i64,
    pub codes: Vec<String>,
    pub fields: Vec<String>,
    /// Row-major: `cells[code_index][field_index]`.
    pub cells: Vec<Vec<Value>>,
}

impl FieldTable {
    pub fn failed(status: i64) -> Self {
        Self {
            status,
            codes: Vec::new(),
            fields: Vec::new(),
            cells: Vec::new(),
        }
    }

    pub const fn is_ok(&self) -> bool {
        self.status == 0
    }

    /// Turns a non-zero batch status into an error.
    pub fn into_checked(self) -> Result<Self, SourceError> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(SourceError::batch_failed(Endpoint::Snapshot, self.status))
        }
    }

    fn code_index(&self, code: &InstrumentCode) -> Option<usize> {
        self.codes
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(code.as_str()))
    }

    fn field_index(&self, field: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(field))
    }

    /// Raw cell; `None` when the code or field is absent from the response.
    pub fn value(&self, code: &InstrumentCode, field: &str) -> Option<&Value> {
        let row = self.code_index(code)?;
        let column = self.field_index(field)?;
        self.cells.get(row)?.get(column)
    }

    pub fn number(&self, code: &InstrumentCode, field: &str) -> Option<f64> {
        self.value(code, field).and_then(cell_number)
    }

    pub fn text(&self, code: &InstrumentCode, field: &str) -> Option<&str> {
        self.value(code, field).and_then(cell_text)
    }
}

/// Daily series response for a single field: one column per code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesTable {
    pub status: i64,
    pub field: String,
    pub dates: Vec<IsoDate>,
    pub codes: Vec<String>,
    /// Column-major: `values[code_index][date_index]`.
    pub values: Vec<Vec<Option<f64>>>,
}

impl SeriesTable {
    pub fn failed(field: impl Into<String>, status: i64) -> Self {
        Self {
            status,
            field: field.into(),
            dates: Vec::new(),
            codes: Vec::new(),
            values: Vec::new(),
        }
    }

    pub const fn is_ok(&self) -> bool {
        self.status == 0
    }

    pub fn into_checked(self) -> Result<Self, SourceError> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(SourceError::batch_failed(Endpoint::Series, self.status))
        }
    }

    pub fn column(&self, code: &InstrumentCode) -> Option<&[Option<f64>]> {
        let index = self
            .codes
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(code.as_str()))?;
        self.values.get(index).map(Vec::as_slice)
    }

    /// Available `(date, value)` pairs for `code`, skipping gaps.
    pub fn observations(&self, code: &InstrumentCode) -> Vec<(IsoDate, f64)> {
        self.column(code)
            .map(|column| {
                self.dates
                    .iter()
                    .zip(column)
                    .filter_map(|(date, value)| {
                        value.filter(|v| v.is_finite()).map(|v| (*date, v))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Named report response: columns by name, rows in terminal order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub status: i64,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Dataset {
    pub fn failed(status: i64) -> Self {
        Self {
            status,
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub const fn is_ok(&self) -> bool {
        self.status == 0
    }

    pub fn into_checked(self) -> Result<Self, SourceError> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(SourceError::batch_failed(Endpoint::Dataset, self.status))
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(name))
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Boxed future returned by every [`TerminalSource`] method.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Terminal source contract.
///
/// Implementations must be `Send + Sync`; a single instance is shared by every
/// command handler through [`AppState`](crate::AppState).
///
/// | Method | Description |
/// |--------|-------------|
/// | [`id`](TerminalSource::id) | Source identifier for envelopes |
/// | [`snapshot`](TerminalSource::snapshot) | Fields per code |
/// | [`series`](TerminalSource::series) | Daily values of one field |
/// | [`dataset`](TerminalSource::dataset) | Named reports |
///
/// A non-zero batch status is returned inside the response, not as an error;
/// transport problems are errors.
pub trait TerminalSource: Send + Sync {
    fn id(&self) -> SourceId;

    fn snapshot<'a>(&'a self, req: SnapshotRequest) -> SourceFuture<'a, FieldTable>;

    fn series<'a>(&'a self, req: SeriesRequest) -> SourceFuture<'a, SeriesTable>;

    fn dataset<'a>(&'a self, req: DatasetRequest) -> SourceFuture<'a, Dataset>;
}
