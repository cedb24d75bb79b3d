//! One-variable ordinary least squares with intercept.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::{FittingError, MetricTable};

/// Fitted `y = intercept + slope · x`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionFit {
    pub intercept: f64,
    pub slope: f64,
    pub r_squared: f64,
    /// Two-sided p-value of the slope; absent with only two observations.
    pub p_value: Option<f64>,
    pub observations: usize,
}

impl RegressionFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Fits `y` on `x`. Requires at least two finite pairs and non-constant `x`.
pub fn fit_ols(x: &[f64], y: &[f64]) -> Result<RegressionFit, FittingError> {
    if x.len() != y.len() {
        return Err(FittingError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    let n = x.len();
    if n < 2 {
        return Err(FittingError::TooFewRows { rows: n });
    }
    if let Some(index) = x
        .iter()
        .zip(y)
        .position(|(a, b)| !a.is_finite() || !b.is_finite())
    {
        return Err(FittingError::NonFinite { index });
    }

    let count = n as f64;
    let mean_x = x.iter().sum::<f64>() / count;
    let mean_y = y.iter().sum::<f64>() / count;

    let sxx: f64 = x.iter().map(|a| (a - mean_x).powi(2)).sum();
    let sxy: f64 = x
        .iter()
        .zip(y)
        .map(|(a, b)| (a - mean_x) * (b - mean_y))
        .sum();
    let sst: f64 = y.iter().map(|b| (b - mean_y).powi(2)).sum();

    if sxx <= f64::EPSILON * count * mean_x.abs().max(1.0) {
        return Err(FittingError::ZeroVariance {
            field: String::from("x"),
        });
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    let sse: f64 = x
        .iter()
        .zip(y)
        .map(|(a, b)| (b - (intercept + slope * a)).powi(2))
        .sum();

    let r_squared = if sst > 0.0 {
        (1.0 - sse / sst).clamp(0.0, 1.0)
    } else {
        1.0
    };

    Ok(RegressionFit {
        intercept,
        slope,
        r_squared,
        p_value: slope_p_value(slope, sse, sxx, n),
        observations: n,
    })
}

fn slope_p_value(slope: f64, sse: f64, sxx: f64, n: usize) -> Option<f64> {
    if n <= 2 {
        return None;
    }
    let dof = (n - 2) as f64;
    let standard_error = (sse / dof / sxx).sqrt();
    if standard_error <= 0.0 || !standard_error.is_finite() {
        return Some(0.0);
    }
    let t = slope / standard_error;
    let distribution = StudentsT::new(0.0, 1.0, dof).ok()?;
    Some((2.0 * (1.0 - distribution.cdf(t.abs()))).clamp(0.0, 1.0))
}

/// Fits `y_field` on `x_field` over the rows of a complete table.
pub fn fit_table(
    table: &MetricTable,
    x_field: &str,
    y_field: &str,
) -> Result<RegressionFit, FittingError> {
    let x = column_of(table, x_field)?;
    let y = column_of(table, y_field)?;
    fit_ols(&x, &y)
}

fn column_of(table: &MetricTable, field: &str) -> Result<Vec<f64>, FittingError> {
    table
        .rows()
        .iter()
        .map(|row| {
            row.get(field).ok_or_else(|| FittingError::UnknownVariable {
                field: field.to_owned(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_line_is_recovered() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y: Vec<f64> = x.iter().map(|v| 2.0 + 3.0 * v).collect();

        let fit = fit_ols(&x, &y).expect("fit succeeds");

        assert!((fit.slope - 3.0).abs() < 1e-9);
        assert!((fit.intercept - 2.0).abs() < 1e-9);
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
        assert!(fit.p_value.expect("p-value present") < 1e-9);
        assert_eq!(fit.observations, 5);
    }

    #[test]
    fn two_points_have_no_p_value() {
        let fit = fit_ols(&[0.0, 1.0], &[1.0, 3.0]).expect("fit succeeds");
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert_eq!(fit.p_value, None);
    }

    #[test]
    fn noisy_data_has_moderate_p_value() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let y = [2.0, 1.0, 4.0, 3.0, 6.0, 5.0];

        let fit = fit_ols(&x, &y).expect("fit succeeds");

        assert!(fit.slope > 0.0);
        let p = fit.p_value.expect("p-value present");
        assert!(p > 0.0 && p < 0.1);
        assert!(fit.r_squared > 0.5 && fit.r_squared < 1.0);
    }

    #[test]
    fn constant_x_is_rejected() {
        let err = fit_ols(&[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0]).expect_err("must fail");
        assert!(matches!(err, FittingError::ZeroVariance { .. }));
    }

    #[test]
    fn single_row_is_rejected() {
        let err = fit_ols(&[1.0], &[1.0]).expect_err("must fail");
        assert_eq!(err, FittingError::TooFewRows { rows: 1 });
    }

    #[test]
    fn non_finite_input_is_rejected() {
        let err = fit_ols(&[1.0, f64::NAN, 3.0], &[1.0, 2.0, 3.0]).expect_err("must fail");
        assert_eq!(err, FittingError::NonFinite { index: 1 });
    }
}
