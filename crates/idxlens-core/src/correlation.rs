//! Pearson correlation of index closes against a fixed asset-class basket.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::data_source::{SeriesRequest, TerminalSource};
use crate::performance::index_names;
use crate::{AnalysisError, DateRange, InstrumentCode, IsoDate};

/// Benchmark basket and display names.
pub const ASSET_BASKET: [(&str, &str); 6] = [
    ("CBA08301.CS", "CDB bond 1-5Y"),
    ("AU9999.SGE", "SGE gold"),
    ("DCESMFI.DCE", "DCE soybean meal futures"),
    ("IMCI.SHF", "SHFE non-ferrous metals"),
    ("000201.CZC", "Yisheng energy & chemicals A"),
    ("H11014.CSI", "CSI short-term notes"),
];

/// Pearson coefficient over index-aligned pairs where both sides are present.
///
/// Returns `None` with fewer than two shared points or when either side has
/// zero variance.
pub fn pearson(x: &[Option<f64>], y: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| Some(((*a)?, (*b)?)))
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(a, _)| a).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, b)| b).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        let (dx, dy) = (a - mean_x, b - mean_y);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub codes: Vec<InstrumentCode>,
    pub names: Vec<String>,
    /// `values[i][j]` correlates `codes[i]` with `codes[j]`.
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    /// Builds the matrix from per-code observations joined on date.
    pub fn from_series(
        codes: Vec<InstrumentCode>,
        names: Vec<String>,
        series: &[BTreeMap<IsoDate, f64>],
    ) -> Self {
        let dates: Vec<IsoDate> = series
            .iter()
            .flat_map(|observations| observations.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let aligned: Vec<Vec<Option<f64>>> = series
            .iter()
            .map(|observations| dates.iter().map(|d| observations.get(d).copied()).collect())
            .collect();

        let values = aligned
            .iter()
            .map(|left| aligned.iter().map(|right| pearson(left, right)).collect())
            .collect();

        Self {
            codes,
            names,
            values,
        }
    }

    pub fn get(&self, row: &InstrumentCode, column: &InstrumentCode) -> Option<f64> {
        let i = self.codes.iter().position(|code| code == row)?;
        let j = self.codes.iter().position(|code| code == column)?;
        self.values[i][j]
    }
}

/// Correlates the selected indices with each other and with [`ASSET_BASKET`].
pub async fn correlation_matrix(
    source: &dyn TerminalSource,
    codes: &[InstrumentCode],
    range: DateRange,
) -> Result<CorrelationMatrix, AnalysisError> {
    let basket = ASSET_BASKET
        .iter()
        .map(|(code, _)| InstrumentCode::parse(code))
        .collect::<Result<Vec<_>, _>>()?;

    let index_series = source
        .series(SeriesRequest::new(codes.to_vec(), "close", range)?)
        .await?
        .into_checked()?;
    let basket_series = source
        .series(SeriesRequest::new(basket.clone(), "close", range)?)
        .await?
        .into_checked()?;
    let names = index_names(source, codes).await?;

    let mut all_codes = Vec::with_capacity(codes.len() + basket.len());
    let mut labels = Vec::with_capacity(all_codes.capacity());
    let mut series: Vec<BTreeMap<IsoDate, f64>> = Vec::with_capacity(all_codes.capacity());
    for code in codes {
        labels.push(names.get(code).cloned().unwrap_or_else(|| code.to_string()));
        series.push(index_series.observations(code).into_iter().collect());
        all_codes.push(code.clone());
    }
    for (code, (_, name)) in basket.iter().zip(ASSET_BASKET) {
        labels.push(name.to_owned());
        series.push(basket_series.observations(code).into_iter().collect());
        all_codes.push(code.clone());
    }

    if series.iter().all(BTreeMap::is_empty) {
        return Err(AnalysisError::data_unavailable(
            "no close prices in the selected range",
        ));
    }
    tracing::debug!(codes = all_codes.len(), "computed correlation matrix");
    Ok(CorrelationMatrix::from_series(all_codes, labels, &series))
}
