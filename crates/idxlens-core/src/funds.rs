//! Tracking-fund metrics and the fund scatter/regression analysis.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data_source::{
    cell_number, cell_text, DatasetRequest, SeriesRequest, SnapshotRequest, TerminalSource,
};
use crate::normalize::{log_scale, trim_outliers};
use crate::regression::{fit_table, RegressionFit};
use crate::{
    AnalysisError, DateRange, DroppedRow, InstrumentCode, IsoDate, MetricRow, MetricTable,
    ValidationError,
};

/// Dataset listing the funds that track an index.
pub const TRACKING_FUND_DATASET: &str = "indexrelevancefund";
/// Share series field used for share volatility.
pub const FUND_SHARE_FIELD: &str = "unit_fundshare_total";

const EXCLUDED_SUFFIX: &str = "HK";
const YUAN_PER_UNIT: f64 = 1e8;
const TRADING_DAYS: f64 = 252.0;

const NAME_FIELD: &str = "fund_info_name";
const TRACKING_ERROR_FIELD: &str = "risk_trackerror_trackindex";
const EXCESS_RETURN_FIELD: &str = "risk_navoverbenchannualreturn";
const NET_ASSET_FIELD: &str = "netasset_total_cc";

/// Metric keys stored on each fund row.
pub mod fields {
    pub const TRACKING_ERROR: &str = "tracking_error";
    pub const EXCESS_RETURN: &str = "excess_return";
    pub const SCALE: &str = "scale";
    pub const SHARE_VOLATILITY: &str = "share_volatility";
    pub const LOG_SCALE: &str = "log_scale";
}

/// Fund listing row from the tracking-fund dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingFund {
    pub code: InstrumentCode,
    pub name: String,
    /// Fund size in units of 1e8 CNY.
    pub scale: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excess_return: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fund_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub established: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_nav: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_fee: Option<f64>,
}

/// Every fund tracking `index` as of `date`, in listing order.
///
/// Rows whose fund code cannot be parsed are skipped.
pub async fn tracking_funds(
    source: &dyn TerminalSource,
    index: &InstrumentCode,
    date: IsoDate,
) -> Result<Vec<TrackingFund>, AnalysisError> {
    let request = DatasetRequest::new(TRACKING_FUND_DATASET)?
        .with_option(format!("date={};windcode={index}", date.format_compact()));
    let dataset = source.dataset(request).await?.into_checked()?;

    let text = |row: usize, column: &str| {
        dataset
            .cell(row, column)
            .and_then(cell_text)
            .map(str::to_owned)
    };
    let number = |row: usize, column: &str| dataset.cell(row, column).and_then(cell_number);

    let funds: Vec<TrackingFund> = (0..dataset.len())
        .filter_map(|row| {
            let code = dataset
                .cell(row, "fundcode")
                .and_then(cell_text)
                .and_then(|raw| InstrumentCode::parse(raw).ok())?;
            Some(TrackingFund {
                code,
                name: text(row, "fundname").unwrap_or_default(),
                scale: number(row, "scale")
                    .map(|yuan| yuan / YUAN_PER_UNIT)
                    .unwrap_or(0.0),
                excess_return: number(row, "excessreturn"),
                fund_type: text(row, "fundtype"),
                company: text(row, "company"),
                manager: text(row, "fundmanager"),
                established: text(row, "establishmentday"),
                unit_nav: number(row, "unitnav"),
                management_fee: number(row, "managementrate"),
            })
        })
        .collect();

    tracing::debug!(index = %index, funds = funds.len(), "loaded tracking funds");
    Ok(funds)
}

/// Fund share class, derived from the fund name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundKind {
    EtfFeeder,
    Etf,
    OffExchange,
}

impl FundKind {
    pub const ALL: [Self; 3] = [Self::EtfFeeder, Self::Etf, Self::OffExchange];

    pub fn from_name(name: &str) -> Self {
        if name.contains("联接") {
            Self::EtfFeeder
        } else if name.contains("ETF") {
            Self::Etf
        } else {
            Self::OffExchange
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EtfFeeder => "etf_feeder",
            Self::Etf => "etf",
            Self::OffExchange => "off_exchange",
        }
    }
}

impl Display for FundKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Annualized volatility of daily share changes, in percent.
///
/// Needs at least two daily changes; zero-share days yield no change.
pub fn share_volatility(shares: &[f64]) -> Option<f64> {
    let changes: Vec<f64> = shares
        .windows(2)
        .filter(|pair| pair[0] != 0.0)
        .map(|pair| pair[1] / pair[0] - 1.0)
        .filter(|change| change.is_finite())
        .collect();
    if changes.len() < 2 {
        return None;
    }
    let count = changes.len() as f64;
    let mean = changes.iter().sum::<f64>() / count;
    let variance = changes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / (count - 1.0);
    Some(variance.sqrt() * TRADING_DAYS.sqrt() * 100.0)
}

/// Per-fund metrics with every incomplete row already removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundMetrics {
    pub table: MetricTable,
    pub dropped: Vec<DroppedRow>,
    pub warnings: Vec<String>,
}

/// Loads tracking error, excess return, size and share volatility for `codes`.
///
/// Share series are requested one fund at a time, in input order.
pub async fn fund_metrics(
    source: &dyn TerminalSource,
    codes: &[InstrumentCode],
    range: DateRange,
) -> Result<FundMetrics, AnalysisError> {
    let mut metrics = FundMetrics::default();
    let codes: Vec<InstrumentCode> = codes
        .iter()
        .filter(|code| code.suffix() != EXCLUDED_SUFFIX)
        .cloned()
        .collect();
    if codes.is_empty() {
        return Err(AnalysisError::data_unavailable("no fund codes to analyse"));
    }

    let start = range.start().format_compact();
    let end = range.end().format_compact();
    let request = SnapshotRequest::new(
        codes.clone(),
        [NAME_FIELD, TRACKING_ERROR_FIELD, EXCESS_RETURN_FIELD, NET_ASSET_FIELD],
    )?
    .with_option(format!(
        "startDate={start};endDate={end};period=1;returnType=1;unit=1;tradeDate={end};currencyType=Cur=CNY"
    ));
    let snapshot = source.snapshot(request).await?.into_checked()?;

    let mut table = MetricTable::new();
    for code in &codes {
        let mut row = MetricRow::new(code.clone());
        if let Some(name) = snapshot.text(code, NAME_FIELD) {
            row = row.with_label(name);
        }
        row.set(fields::TRACKING_ERROR, snapshot.number(code, TRACKING_ERROR_FIELD));
        row.set(fields::EXCESS_RETURN, snapshot.number(code, EXCESS_RETURN_FIELD));
        let scale = snapshot
            .number(code, NET_ASSET_FIELD)
            .map(|yuan| yuan / YUAN_PER_UNIT);
        row.set(fields::SCALE, scale);
        row.set(fields::LOG_SCALE, scale.and_then(log_scale));
        table.push(row);
    }
    let mut dropped = table.retain_complete(&[
        fields::TRACKING_ERROR,
        fields::EXCESS_RETURN,
        fields::SCALE,
        fields::LOG_SCALE,
    ]);
    table.retain_codes(|code| {
        let named = snapshot.text(code, NAME_FIELD).is_some();
        if !named {
            dropped.push(DroppedRow {
                code: code.clone(),
                missing: vec![String::from("name")],
            });
        }
        named
    });

    let mut rows = Vec::with_capacity(table.len());
    for mut row in table.rows().iter().cloned() {
        let request = SeriesRequest::new(vec![row.code.clone()], FUND_SHARE_FIELD, range)?;
        let series = source.series(request).await?;
        let volatility = if series.is_ok() {
            let shares: Vec<f64> = series
                .observations(&row.code)
                .into_iter()
                .map(|(_, value)| value)
                .collect();
            share_volatility(&shares)
        } else {
            metrics.warnings.push(format!(
                "{}: share series unavailable (status {})",
                row.code, series.status
            ));
            None
        };
        row.set(fields::SHARE_VOLATILITY, volatility);
        rows.push(row);
    }
    let mut table = MetricTable::from_rows(rows);
    dropped.extend(table.retain_complete(&[fields::SHARE_VOLATILITY]));

    for row in &dropped {
        tracing::warn!(code = %row.code, missing = ?row.missing, "dropped fund with missing data");
        metrics
            .warnings
            .push(format!("{}: missing {}", row.code, row.missing.join(", ")));
    }
    if table.is_empty() {
        return Err(AnalysisError::data_unavailable(
            "no fund has complete tracking data",
        ));
    }

    metrics.table = table;
    metrics.dropped = dropped;
    Ok(metrics)
}

/// Variables that can be placed on a scatter axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundVariable {
    TrackingError,
    ExcessReturn,
    ShareVolatility,
    Scale,
}

impl FundVariable {
    pub const ALL: [Self; 4] = [
        Self::TrackingError,
        Self::ExcessReturn,
        Self::ShareVolatility,
        Self::Scale,
    ];

    pub const fn field(self) -> &'static str {
        match self {
            Self::TrackingError => fields::TRACKING_ERROR,
            Self::ExcessReturn => fields::EXCESS_RETURN,
            Self::ShareVolatility => fields::SHARE_VOLATILITY,
            Self::Scale => fields::SCALE,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::TrackingError => "tracking error (%)",
            Self::ExcessReturn => "excess return (%)",
            Self::ShareVolatility => "share volatility (%)",
            Self::Scale => "fund size (1e8 CNY)",
        }
    }
}

impl Display for FundVariable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.field())
    }
}

impl FromStr for FundVariable {
    type Err = AnalysisError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|variable| variable.field() == wanted)
            .ok_or_else(|| {
                crate::FittingError::UnknownVariable {
                    field: value.to_owned(),
                }
                .into()
            })
    }
}

/// Bubble sizing shared by the fitted and fallback charts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerSizing {
    pub size_ref: f64,
    pub size_min: f64,
}

impl MarkerSizing {
    pub const SIZE_MIN: f64 = 4.0;
    const DENOMINATOR: f64 = 50.0;

    /// `size_ref = 2 · max(sizes) / 50`; non-positive maxima fall back to 1.
    pub fn from_sizes(sizes: &[f64]) -> Self {
        let max = sizes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let size_ref = if max.is_finite() && max > 0.0 {
            2.0 * max / Self::DENOMINATOR
        } else {
            1.0
        };
        Self {
            size_ref,
            size_min: Self::SIZE_MIN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterPoint {
    pub code: InstrumentCode,
    pub name: String,
    pub x: f64,
    pub y: f64,
    /// Marker size, `ln(scale + 1)`.
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterGroup {
    pub kind: FundKind,
    pub points: Vec<ScatterPoint>,
}

/// Fitted line endpoints over `[x_min, x_max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionLine {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

/// Chart payload for one fund scatter plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterAnalysis {
    pub x: FundVariable,
    pub y: FundVariable,
    pub threshold: f64,
    pub groups: Vec<ScatterGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit: Option<RegressionFit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<RegressionLine>,
    pub sizing: MarkerSizing,
    pub outliers: Vec<InstrumentCode>,
    pub warnings: Vec<String>,
}

/// Trims MAD outliers on both axes, fits `y` on `x` and groups points by
/// fund kind. A failed fit leaves `fit`/`line` empty and adds a warning.
pub fn scatter_analysis(
    metrics: &MetricTable,
    x: FundVariable,
    y: FundVariable,
    threshold: f64,
) -> Result<ScatterAnalysis, AnalysisError> {
    if !(threshold.is_finite() && threshold > 0.0) {
        return Err(ValidationError::NonFiniteValue {
            field: String::from("threshold"),
        }
        .into());
    }

    let mut complete = metrics.clone();
    let mut warnings: Vec<String> = complete
        .retain_complete(&[x.field(), y.field(), fields::LOG_SCALE])
        .into_iter()
        .map(|row| format!("{}: missing {}", row.code, row.missing.join(", ")))
        .collect();
    if complete.is_empty() {
        return Err(AnalysisError::data_unavailable(
            "no fund has both scatter variables",
        ));
    }

    let (trimmed, outliers) = trim_outliers(&complete, &[x.field(), y.field()], threshold);
    if !outliers.is_empty() {
        tracing::info!(removed = outliers.len(), threshold, "trimmed scatter outliers");
    }

    let (fit, line) = match fit_table(&trimmed, x.field(), y.field()) {
        Ok(fit) => {
            let xs = trimmed.column(x.field());
            let x0 = xs.iter().copied().fold(f64::INFINITY, f64::min);
            let x1 = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let line = RegressionLine {
                x0,
                y0: fit.predict(x0),
                x1,
                y1: fit.predict(x1),
            };
            (Some(fit), Some(line))
        }
        Err(error) => {
            tracing::warn!(%error, "scatter regression skipped");
            warnings.push(format!("regression skipped: {error}"));
            (None, None)
        }
    };

    let sizing = MarkerSizing::from_sizes(&trimmed.column(fields::LOG_SCALE));
    let groups = FundKind::ALL
        .into_iter()
        .filter_map(|kind| {
            let points: Vec<ScatterPoint> = trimmed
                .rows()
                .iter()
                .filter(|row| FundKind::from_name(row.label.as_deref().unwrap_or_default()) == kind)
                .filter_map(|row| {
                    Some(ScatterPoint {
                        code: row.code.clone(),
                        name: row.label.clone().unwrap_or_default(),
                        x: row.get(x.field())?,
                        y: row.get(y.field())?,
                        size: row.get(fields::LOG_SCALE)?,
                    })
                })
                .collect();
            (!points.is_empty()).then_some(ScatterGroup { kind, points })
        })
        .collect();

    Ok(ScatterAnalysis {
        x,
        y,
        threshold,
        groups,
        fit,
        line,
        sizing,
        outliers,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fund_kind_prefers_feeder_marker() {
        assert_eq!(FundKind::from_name("华夏沪深300ETF联接A"), FundKind::EtfFeeder);
        assert_eq!(FundKind::from_name("华泰柏瑞沪深300ETF"), FundKind::Etf);
        assert_eq!(FundKind::from_name("易方达沪深300指数A"), FundKind::OffExchange);
    }

    #[test]
    fn share_volatility_needs_two_changes() {
        assert_eq!(share_volatility(&[100.0, 101.0]), None);
        let vol = share_volatility(&[100.0, 101.0, 100.0, 102.0]).expect("computed");
        assert!(vol > 0.0);
    }

    #[test]
    fn constant_shares_have_zero_volatility() {
        assert_eq!(share_volatility(&[5.0, 5.0, 5.0]), Some(0.0));
    }

    #[test]
    fn marker_sizing_uses_one_convention() {
        let sizing = MarkerSizing::from_sizes(&[1.0, 2.5, 5.0]);
        assert!((sizing.size_ref - 0.2).abs() < 1e-12);
        assert_eq!(sizing.size_min, 4.0);
        assert_eq!(MarkerSizing::from_sizes(&[]).size_ref, 1.0);
    }

    #[test]
    fn variable_names_parse_from_cli_spelling() {
        assert_eq!(
            "share-volatility".parse::<FundVariable>().expect("known"),
            FundVariable::ShareVolatility
        );
        assert!("alpha".parse::<FundVariable>().is_err());
    }
}
