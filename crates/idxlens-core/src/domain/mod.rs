//! # Domain Models
//!
//! Canonical domain types shared by the validator, the terminal adapters and
//! the analyses.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`InstrumentCode`] | Canonical `BASE.SUFFIX` code, uppercase |
//! | [`IsoDate`] | Calendar date rendered as `YYYY-MM-DD` |
//! | [`DateRange`] | Inclusive analysis window |
//! | [`MetricTable`] | Per-instrument named numeric fields |
//!
//! All types enforce their invariants at construction time:
//!
//! ```rust
//! use idxlens_core::{DateRange, InstrumentCode, ValidationError};
//!
//! let code = InstrumentCode::parse("000300.sh").unwrap();
//! assert_eq!(code.as_str(), "000300.SH");
//!
//! let inverted = DateRange::parse("2024-02-01", "2024-01-01");
//! assert!(matches!(inverted, Err(ValidationError::InvertedDateRange { .. })));
//! ```

mod code;
mod date_range;
mod metric;

pub use code::{join_codes, InstrumentCode};
pub use date_range::{DateRange, IsoDate};
pub use metric::{DroppedRow, MetricRow, MetricTable};
