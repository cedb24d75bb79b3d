//! Cross-instrument rescaling and robust outlier detection.
//!
//! | Transform | Pre-sigmoid value | Use |
//! |-----------|-------------------|-----|
//! | [`Transform::HigherIsBetter`] | min-max of the raw value | radar scores |
//! | [`Transform::TargetDeviation`] | min-max of `-abs(value - target)` | radar scores |
//! | [`Transform::LogScale`] | `ln(value + 1)`, no sigmoid | marker sizing |
//!
//! Scored columns land in `[0, 100]` via `sigmoid(10x - 5) * 100`. A column
//! whose values are all equal scores 50 everywhere.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::{InstrumentCode, MetricRow, MetricTable};

/// Library default for [`mad_outliers`].
pub const DEFAULT_MAD_THRESHOLD: f64 = 3.0;

/// Sigmoid input is clamped to `[-SIGMOID_CLAMP, SIGMOID_CLAMP]`.
pub const SIGMOID_CLAMP: f64 = 500.0;

/// Direction of "better" for one metric, fixed when the metric is declared.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
    HigherIsBetter,
    TargetDeviation { target: f64 },
    LogScale,
}

pub fn sigmoid(x: f64) -> f64 {
    let x = x.clamp(-SIGMOID_CLAMP, SIGMOID_CLAMP);
    1.0 / (1.0 + (-x).exp())
}

/// Maps a `[0, 1]` value onto `[0, 100]` with the standard S-curve.
pub fn sigmoid_score(unit: f64) -> f64 {
    sigmoid(10.0 * unit - 5.0) * 100.0
}

/// Rescales to `[0, 1]`; a zero-range column maps to 0.5 everywhere.
pub fn min_max(values: &[f64]) -> Vec<f64> {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
            (min.min(*v), max.max(*v))
        });
    let range = max - min;

    values
        .iter()
        .map(|v| {
            if range > 0.0 && range.is_finite() {
                (v - min) / range
            } else {
                0.5
            }
        })
        .collect()
}

/// `ln(value + 1)`, or `None` where the logarithm is undefined.
pub fn log_scale(value: f64) -> Option<f64> {
    (value > -1.0).then(|| (value + 1.0).ln())
}

/// Applies `transform` to a complete column.
///
/// Scoring transforms always yield a value per row; [`Transform::LogScale`]
/// yields `None` for values at or below -1.
pub fn score_column(values: &[f64], transform: Transform) -> Vec<Option<f64>> {
    match transform {
        Transform::HigherIsBetter => min_max(values)
            .into_iter()
            .map(|unit| Some(sigmoid_score(unit)))
            .collect(),
        Transform::TargetDeviation { target } => {
            let deviations: Vec<f64> = values.iter().map(|v| -(v - target).abs()).collect();
            min_max(&deviations)
                .into_iter()
                .map(|unit| Some(sigmoid_score(unit)))
                .collect()
        }
        Transform::LogScale => values.iter().map(|v| log_scale(*v)).collect(),
    }
}

/// Mean 0, sample standard deviation 1. Fewer than two values or zero
/// dispersion yields all zeros.
pub fn zscore(values: &[f64]) -> Vec<f64> {
    if values.len() < 2 {
        return vec![0.0; values.len()];
    }
    let mean = values.iter().copied().mean();
    let std_dev = values.iter().copied().std_dev();
    if std_dev <= 0.0 || !std_dev.is_finite() {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - mean) / std_dev).collect()
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Median absolute deviation around the median (unscaled).
pub fn mad(values: &[f64]) -> Option<f64> {
    let center = median(values)?;
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Indices of values outside `median ± threshold · MAD`.
///
/// With a MAD of zero every value that differs from the median is flagged.
pub fn mad_outliers(values: &[f64], threshold: f64) -> Vec<usize> {
    let (Some(center), Some(spread)) = (median(values), mad(values)) else {
        return Vec::new();
    };
    let lower = center - threshold * spread;
    let upper = center + threshold * spread;

    values
        .iter()
        .enumerate()
        .filter(|(_, v)| **v < lower || **v > upper)
        .map(|(index, _)| index)
        .collect()
}

/// Drops every row that is an outlier on any of `fields` (union of the
/// per-column sets). Rows must already be complete for `fields`.
pub fn trim_outliers(
    table: &MetricTable,
    fields: &[&str],
    threshold: f64,
) -> (MetricTable, Vec<InstrumentCode>) {
    let mut flagged = vec![false; table.len()];
    for field in fields {
        let column: Vec<f64> = table
            .rows()
            .iter()
            .map(|row| row.get(field).unwrap_or(f64::NAN))
            .collect();
        for index in mad_outliers(&column, threshold) {
            flagged[index] = true;
        }
    }

    let mut kept = MetricTable::new();
    let mut removed = Vec::new();
    for (row, is_outlier) in table.rows().iter().zip(flagged) {
        if is_outlier {
            removed.push(row.code.clone());
        } else {
            kept.push(row.clone());
        }
    }
    (kept, removed)
}

/// One metric to score: source field, display label and transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub field: String,
    pub label: String,
    pub transform: Transform,
}

impl MetricSpec {
    pub fn new(field: impl Into<String>, label: impl Into<String>, transform: Transform) -> Self {
        Self {
            field: field.into(),
            label: label.into(),
            transform,
        }
    }
}

/// Scores every column named in `specs` over a complete table. Output rows carry the
/// same codes and labels; values are keyed by each metric's field name.
pub fn score_table(table: &MetricTable, specs: &[MetricSpec]) -> MetricTable {
    let mut rows: Vec<MetricRow> = table
        .rows()
        .iter()
        .map(|row| MetricRow {
            code: row.code.clone(),
            label: row.label.clone(),
            values: Default::default(),
        })
        .collect();

    for spec in specs {
        let column: Vec<f64> = table
            .rows()
            .iter()
            .map(|row| row.get(&spec.field).unwrap_or(f64::NAN))
            .collect();
        for (row, score) in rows.iter_mut().zip(score_column(&column, spec.transform)) {
            row.set(&spec.field, score);
        }
    }

    MetricTable::from_rows(rows)
}

/// Z-scores of each named column, for comparing raw spreads across metrics.
/// Rows must already be complete for `fields`.
pub fn zscore_table(table: &MetricTable, fields: &[&str]) -> MetricTable {
    let mut rows: Vec<MetricRow> = table
        .rows()
        .iter()
        .map(|row| MetricRow {
            code: row.code.clone(),
            label: row.label.clone(),
            values: Default::default(),
        })
        .collect();

    for field in fields {
        let column: Vec<f64> = table
            .rows()
            .iter()
            .map(|row| row.get(field).unwrap_or(f64::NAN))
            .collect();
        for (row, z) in rows.iter_mut().zip(zscore(&column)) {
            row.set(field, Some(z));
        }
    }

    MetricTable::from_rows(rows)
}
