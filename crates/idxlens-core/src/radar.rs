//! Multi-metric index comparison scored onto a common `[0, 100]` scale.
//!
//! | Metric | Terminal source | Transform |
//! |--------|-----------------|-----------|
//! | Sharpness | `risk_maxupside2` | higher is better |
//! | Beta vs benchmark | `beta` with `index=<benchmark>` | higher is better |
//! | Net-profit growth | `np_belongto_parcomsh`, last two annual reports | higher is better |
//! | Year-to-date return | `pct_chg_per` from 1 January | higher is better |
//! | Top-20 concentration | `indexconstituent` weights | closest to 50 |
//! | P/E percentile | `val_pe_percentile` | higher is better |
//! | Calmar ratio | `risk_calmar` | higher is better |

use serde::{Deserialize, Serialize};

use crate::composition::constituent_weights;
use crate::data_source::{FieldTable, SnapshotRequest, TerminalSource};
use crate::normalize::{score_table, zscore_table, MetricSpec, Transform};
use crate::performance::index_names;
use crate::risk::risk_window;
use crate::{AnalysisError, DateRange, DroppedRow, InstrumentCode, MetricRow, MetricTable};

/// Constituents summed for the concentration metric.
pub const CONCENTRATION_TOP_N: usize = 20;
/// Concentration closest to this weight (percent) scores highest.
pub const CONCENTRATION_TARGET: f64 = 50.0;

const PROFIT_FIELD: &str = "np_belongto_parcomsh";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadarMetric {
    Sharpness,
    Beta,
    ProfitGrowth,
    YtdReturn,
    Concentration,
    PePercentile,
    Calmar,
}

impl RadarMetric {
    pub const ALL: [Self; 7] = [
        Self::Sharpness,
        Self::Beta,
        Self::ProfitGrowth,
        Self::YtdReturn,
        Self::Concentration,
        Self::PePercentile,
        Self::Calmar,
    ];

    /// Key used in the raw and scored tables.
    pub const fn key(self) -> &'static str {
        match self {
            Self::Sharpness => "sharpness",
            Self::Beta => "beta",
            Self::ProfitGrowth => "profit_growth",
            Self::YtdReturn => "ytd_return",
            Self::Concentration => "top20_concentration",
            Self::PePercentile => "pe_percentile",
            Self::Calmar => "calmar",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Sharpness => "sharpness",
            Self::Beta => "beta vs benchmark",
            Self::ProfitGrowth => "net profit growth (%)",
            Self::YtdReturn => "year-to-date return (%)",
            Self::Concentration => "top-20 concentration (%)",
            Self::PePercentile => "P/E percentile",
            Self::Calmar => "Calmar ratio",
        }
    }

    pub const fn transform(self) -> Transform {
        match self {
            Self::Concentration => Transform::TargetDeviation {
                target: CONCENTRATION_TARGET,
            },
            _ => Transform::HigherIsBetter,
        }
    }

    pub fn spec(self) -> MetricSpec {
        MetricSpec::new(self.key(), self.label(), self.transform())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadarReport {
    pub benchmark: InstrumentCode,
    pub metrics: Vec<MetricSpec>,
    pub raw: MetricTable,
    pub scores: MetricTable,
    /// Z-scores of the raw values, per metric.
    pub zscores: MetricTable,
    pub dropped: Vec<DroppedRow>,
    pub warnings: Vec<String>,
}

async fn snapshot(
    source: &dyn TerminalSource,
    codes: &[InstrumentCode],
    field: &str,
    options: String,
) -> Result<FieldTable, AnalysisError> {
    let request = SnapshotRequest::new(codes.to_vec(), [field])?.with_option(options);
    Ok(source.snapshot(request).await?.into_checked()?)
}

/// `(current - previous) / |previous| · 100`; a zero base has no growth.
pub fn growth_rate(current: f64, previous: f64) -> Option<f64> {
    (previous != 0.0).then(|| (current - previous) / previous.abs() * 100.0)
}

/// Sum of the `CONCENTRATION_TOP_N` largest weights.
pub fn top_weight_sum(weights: &[f64]) -> Option<f64> {
    if weights.is_empty() {
        return None;
    }
    let mut sorted = weights.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    Some(sorted.iter().take(CONCENTRATION_TOP_N).sum())
}

async fn profit_growth(
    source: &dyn TerminalSource,
    codes: &[InstrumentCode],
    end_year: i32,
) -> Result<Vec<Option<f64>>, AnalysisError> {
    let report = |year: i32| format!("unit=1;rptDate={year}1231;rptType=1");

    // Latest annual report: last year if any index has it, otherwise the year before.
    let mut latest_year = end_year - 1;
    let mut latest = snapshot(source, codes, PROFIT_FIELD, report(latest_year)).await?;
    if codes.iter().all(|code| latest.number(code, PROFIT_FIELD).is_none()) {
        latest_year -= 1;
        latest = snapshot(source, codes, PROFIT_FIELD, report(latest_year)).await?;
    }
    let previous = snapshot(source, codes, PROFIT_FIELD, report(latest_year - 1)).await?;

    Ok(codes
        .iter()
        .map(|code| {
            let current = latest.number(code, PROFIT_FIELD)?;
            let prior = previous.number(code, PROFIT_FIELD)?;
            growth_rate(current, prior)
        })
        .collect())
}

async fn concentration(
    source: &dyn TerminalSource,
    index: &InstrumentCode,
    range: DateRange,
) -> Result<Option<f64>, AnalysisError> {
    let weights: Vec<f64> = constituent_weights(source, index, range.end())
        .await?
        .into_iter()
        .filter_map(|constituent| constituent.weight)
        .collect();
    Ok(top_weight_sum(&weights))
}

/// Scores `codes` on every [`RadarMetric`]. `benchmark` defaults to the
/// first code.
pub async fn radar_scores(
    source: &dyn TerminalSource,
    codes: &[InstrumentCode],
    benchmark: Option<&InstrumentCode>,
    range: DateRange,
) -> Result<RadarReport, AnalysisError> {
    if codes.len() < 2 {
        return Err(AnalysisError::data_unavailable(
            "radar comparison needs at least two indices",
        ));
    }
    let benchmark = benchmark.unwrap_or(&codes[0]).clone();
    let start = range.start().format_compact();
    let end = range.end().format_compact();
    let window = risk_window(range);

    let names = index_names(source, codes).await?;
    let sharpness = snapshot(source, codes, "risk_maxupside2", window.clone()).await?;
    let calmar = snapshot(source, codes, "risk_calmar", window.clone()).await?;
    let beta = snapshot(source, codes, "beta", format!("{window};index={benchmark}")).await?;
    let ytd = snapshot(
        source,
        codes,
        "pct_chg_per",
        format!("startDate={}0101;endDate={end}", range.end().year()),
    )
    .await?;
    let pe = snapshot(
        source,
        codes,
        "val_pe_percentile",
        format!("tradeDate={end};startDate={start};endDate={end}"),
    )
    .await?;
    let growth = profit_growth(source, codes, range.end().year()).await?;

    let mut raw = MetricTable::new();
    for (code, growth) in codes.iter().zip(growth) {
        let mut row = MetricRow::new(code.clone());
        if let Some(name) = names.get(code) {
            row = row.with_label(name.clone());
        }
        row.set(RadarMetric::Sharpness.key(), sharpness.number(code, "risk_maxupside2"));
        row.set(RadarMetric::Beta.key(), beta.number(code, "beta"));
        row.set(RadarMetric::ProfitGrowth.key(), growth);
        row.set(RadarMetric::YtdReturn.key(), ytd.number(code, "pct_chg_per"));
        row.set(
            RadarMetric::Concentration.key(),
            concentration(source, code, range).await?,
        );
        row.set(RadarMetric::PePercentile.key(), pe.number(code, "val_pe_percentile"));
        row.set(RadarMetric::Calmar.key(), calmar.number(code, "risk_calmar"));
        raw.push(row);
    }

    let keys: Vec<&str> = RadarMetric::ALL.iter().map(|metric| metric.key()).collect();
    let dropped = raw.retain_complete(&keys);
    let warnings: Vec<String> = dropped
        .iter()
        .map(|row| {
            tracing::warn!(code = %row.code, missing = ?row.missing, "dropped index from radar");
            format!("{}: missing {}", row.code, row.missing.join(", "))
        })
        .collect();
    if raw.is_empty() {
        return Err(AnalysisError::data_unavailable(
            "no index has every radar metric",
        ));
    }

    let metrics: Vec<MetricSpec> = RadarMetric::ALL.iter().map(|metric| metric.spec()).collect();
    let scores = score_table(&raw, &metrics);
    let zscores = zscore_table(&raw, &keys);

    Ok(RadarReport {
        benchmark,
        metrics,
        raw,
        scores,
        zscores,
        dropped,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_uses_absolute_base() {
        assert_eq!(growth_rate(120.0, 100.0), Some(20.0));
        assert_eq!(growth_rate(-50.0, -100.0), Some(50.0));
        assert_eq!(growth_rate(1.0, 0.0), None);
    }

    #[test]
    fn concentration_sums_largest_twenty() {
        let mut weights = vec![1.0; 30];
        weights[29] = 10.0;
        assert_eq!(top_weight_sum(&weights), Some(29.0));
        assert_eq!(top_weight_sum(&[]), None);
    }

    #[test]
    fn only_concentration_targets_a_value() {
        for metric in RadarMetric::ALL {
            let expected = metric == RadarMetric::Concentration;
            assert_eq!(
                matches!(metric.transform(), Transform::TargetDeviation { .. }),
                expected
            );
        }
    }
}
