use log::debug;
use serde::Serialize;

use crate::error::DegenerateError;

/// Default fraction of the x range the fitted line extends beyond the data.
pub const DEFAULT_FRACTION_BEYOND_RANGE: f32 = 0.1;

/// Result of an ordinary least-squares line fit `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitResult {
    pub slope: f32,
    pub intercept: f32,
    pub slope_uncertainty: f32,
    pub intercept_uncertainty: f32,
    /// Coefficient of determination: the closer to 1, the better the fit.
    pub r_squared: f32,
    /// Two x coordinates slightly beyond the fitted range, for downstream
    /// rendering of the fit line.
    pub line_x: [f32; 2],
    pub line_y: [f32; 2],
}

/// Fit `y = slope * x + intercept` by ordinary least squares.
///
/// Pairs with a non-finite `y` are excluded before fitting. The slope and
/// intercept uncertainties come from the residual variance over `N - 2`
/// degrees of freedom. `weights` is accepted for interface compatibility but
/// the fit is unweighted; this is a known limitation, not a silent upgrade.
///
/// Fewer than 3 finite pairs, a zero-variance `x` or a non-finite
/// determinant are degenerate: the fit returns an error instead of `NaN`.
pub fn linear_fit(
    x: &[f32],
    y: &[f32],
    weights: Option<&[f32]>,
    fraction_beyond_range: f32,
) -> Result<FitResult, DegenerateError> {
    if weights.is_some() {
        debug!("weights were supplied but the fit is unweighted");
    }

    let pairs: Vec<(f32, f32)> = x
        .iter()
        .zip(y.iter())
        .filter(|&(_, &yi)| yi.is_finite())
        .map(|(&xi, &yi)| (xi, yi))
        .collect();

    let count = pairs.len();
    if count < 3 {
        return Err(DegenerateError::TooFewPoints(count));
    }
    let n = count as f32;

    let sum_x: f32 = pairs.iter().map(|(xi, _)| xi).sum();
    let sum_x2: f32 = pairs.iter().map(|(xi, _)| xi * xi).sum();
    let sum_y: f32 = pairs.iter().map(|(_, yi)| yi).sum();
    let sum_xy: f32 = pairs.iter().map(|(xi, yi)| xi * yi).sum();

    let determinant = n * sum_x2 - sum_x * sum_x;
    if !determinant.is_finite() || determinant.abs() <= f32::EPSILON * n * sum_x2.abs() {
        return Err(DegenerateError::ZeroDeterminant);
    }

    let slope = (n * sum_xy - sum_x * sum_y) / determinant;
    let intercept = (sum_x2 * sum_y - sum_x * sum_xy) / determinant;

    let residual_sum: f32 = pairs
        .iter()
        .map(|(xi, yi)| {
            let residual = yi - (slope * xi + intercept);
            residual * residual
        })
        .sum();
    let residual_variance = residual_sum / (n - 2.0);
    let slope_uncertainty = (residual_variance * n / determinant).sqrt();
    let intercept_uncertainty = (residual_variance * sum_x2 / determinant).sqrt();

    let mean_y = sum_y / n;
    let total_sum: f32 = pairs
        .iter()
        .map(|(_, yi)| {
            let difference = yi - mean_y;
            difference * difference
        })
        .sum();
    // A flat response leaves no variance to explain; the exact fit counts as 1.
    let r_squared = if total_sum > 0.0 {
        1.0 - residual_sum / total_sum
    } else {
        1.0
    };

    let (min_x, max_x) = pairs
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &(xi, _)| {
            (lo.min(xi), hi.max(xi))
        });
    let range = max_x - min_x;
    let line_x = [
        min_x - fraction_beyond_range * range,
        max_x + fraction_beyond_range * range,
    ];
    let line_y = [
        slope * line_x[0] + intercept,
        slope * line_x[1] + intercept,
    ];

    Ok(FitResult {
        slope,
        intercept,
        slope_uncertainty,
        intercept_uncertainty,
        r_squared,
        line_x,
        line_y,
    })
}
