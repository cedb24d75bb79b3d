//! Core contracts for idxlens.
//!
//! This crate contains:
//! - Canonical domain models and index-code validation
//! - The terminal source trait, its gateway and fixture adapters, and the response cache
//! - Remote verification and the per-session submission flow
//! - Analyses: profiles, returns, valuation, risk, earnings, composition, radar scores,
//!   correlation, and fund scatter regression
//! - Response envelope and structured errors

pub mod adapters;
pub mod app;
pub mod cache;
pub mod composition;
pub mod config;
pub mod correlation;
pub mod data_source;
pub mod domain;
pub mod earnings;
pub mod envelope;
pub mod error;
pub mod funds;
pub mod http_client;
pub mod normalize;
pub mod performance;
pub mod profile;
pub mod radar;
pub mod regression;
pub mod risk;
pub mod session;
pub mod source;
pub mod throttling;
pub mod upload;
pub mod validator;
pub mod verifier;

pub use adapters::{FixtureSource, GatewayAdapter};
pub use app::AppState;
pub use cache::{CacheKey, CacheMode, CacheStore, CachedSource};
pub use composition::{composition, CompositionReport, IndustryLevel, IndustryScheme};
pub use config::AppConfig;
pub use correlation::{correlation_matrix, CorrelationMatrix};
pub use data_source::{
    Dataset, DatasetRequest, Endpoint, FieldTable, SeriesRequest, SeriesTable, SnapshotRequest,
    SourceError, SourceErrorKind, TerminalSource,
};
pub use domain::{join_codes, DateRange, DroppedRow, InstrumentCode, IsoDate, MetricRow, MetricTable};
pub use earnings::{earnings, EarningsReport};
pub use envelope::{Envelope, EnvelopeError, EnvelopeMeta};
pub use error::{AnalysisError, CoreError, FittingError, UploadError, ValidationError};
pub use funds::{fund_metrics, scatter_analysis, tracking_funds, FundMetrics, FundVariable, ScatterAnalysis};
pub use http_client::{HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse};
pub use normalize::{mad_outliers, MetricSpec, Transform};
pub use performance::{cumulative_returns, valuation_history, valuation_percentiles, yearly_returns};
pub use profile::{index_profiles, IndexProfile};
pub use radar::{radar_scores, RadarMetric, RadarReport};
pub use regression::{fit_ols, RegressionFit};
pub use risk::{risk_table, BetaMatrix, RiskReport};
pub use session::{FormSubmission, SessionState};
pub use source::SourceId;
pub use throttling::Throttle;
pub use upload::{read_code_file, UploadedFile};
pub use validator::{validate_codes, CodeValidation};
pub use verifier::{verify_codes, Verification};
