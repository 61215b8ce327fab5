use log::debug;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use std::f32::consts::PI;

use crate::error::QualityNote;

/// Default number of Monte-Carlo experiments for the median uncertainty.
pub const DEFAULT_UNCERTAINTY_TRIALS: usize = 1000;

/// Mean, variance and standard deviation of a sample.
///
/// Population normalization throughout: the variance divides by N, not N - 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SampleStats {
    pub mean: f32,
    pub variance: f32,
    pub standard_deviation: f32,
}

/// Median and quantile summary of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quantiles {
    pub median: f32,
    pub lower: f32,
    pub upper: f32,
    /// Spread of the median under the supplied per-value uncertainties;
    /// `None` when no uncertainties were given.
    pub median_uncertainty: Option<f32>,
}

/// Remove non-finite entries, or replace them in place when a replacement
/// value is given.
pub fn screen_non_finite(values: &[f32], replacement: Option<f32>) -> Vec<f32> {
    match replacement {
        Some(replacement) => values
            .iter()
            .map(|&v| if v.is_finite() { v } else { replacement })
            .collect(),
        None => values.iter().copied().filter(|v| v.is_finite()).collect(),
    }
}

/// Mean, variance and standard deviation, optionally stripping non-finite
/// entries first. An empty sample (after stripping) has no statistics.
pub fn mean_variance_sd(values: &[f32], remove_invalid: bool) -> Option<SampleStats> {
    let screened;
    let values = if remove_invalid {
        screened = screen_non_finite(values, None);
        &screened[..]
    } else {
        values
    };
    if values.is_empty() {
        return None;
    }

    let count = values.len() as f32;
    let mean = values.iter().sum::<f32>() / count;
    let variance = values
        .iter()
        .map(|&v| {
            let difference = v - mean;
            difference * difference
        })
        .sum::<f32>()
        / count;

    Some(SampleStats {
        mean,
        variance,
        standard_deviation: variance.sqrt(),
    })
}

fn median_of_sorted(sorted: &[f32]) -> f32 {
    let count = sorted.len();
    if count % 2 == 1 {
        sorted[count / 2]
    } else {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    }
}

/// Linear interpolation at the virtual index `quantile * (N - 1)` of the
/// sorted sample.
fn quantile_of_sorted(sorted: &[f32], quantile: f32) -> f32 {
    let virtual_index = quantile * (sorted.len() - 1) as f32;
    let index = virtual_index as usize;
    if index >= sorted.len() - 1 {
        return sorted[sorted.len() - 1];
    }
    let fraction = virtual_index - index as f32;
    sorted[index] + (sorted[index + 1] - sorted[index]) * fraction
}

/// Median and quantiles of a sample, with an optional uncertainty on the
/// median.
///
/// `lower_percentage` and `upper_percentage` are in percent (e.g. 25 and 75
/// for the quartiles). With `remove_invalid`, non-finite values are stripped
/// together with their paired uncertainties.
///
/// The median uncertainty depends on the shape of `uncertainties`:
/// - empty: no uncertainty is computed;
/// - exactly one entry: that value is the uncertainty of the median,
///   reported with a [`QualityNote::SingleUncertaintyShortcut`];
/// - one entry per value: `trials` Monte-Carlo experiments each redraw every
///   value from a normal distribution centered on it with its uncertainty as
///   standard deviation; the uncertainty is the standard deviation of the
///   experiment medians;
/// - anything else: [`QualityNote::MismatchedUncertainties`], no uncertainty.
///
/// An empty sample (after stripping) yields `None`.
pub fn median_and_quantiles(
    values: &[f32],
    lower_percentage: f32,
    upper_percentage: f32,
    remove_invalid: bool,
    uncertainties: &[f32],
    trials: usize,
    rng: &mut impl Rng,
) -> (Option<Quantiles>, Vec<QualityNote>) {
    let mut notes = Vec::new();

    let (values, uncertainties) = if remove_invalid {
        if uncertainties.len() == values.len() {
            let mut kept_values = Vec::with_capacity(values.len());
            let mut kept_uncertainties = Vec::with_capacity(uncertainties.len());
            for (&value, &uncertainty) in values.iter().zip(uncertainties.iter()) {
                if value.is_finite() {
                    kept_values.push(value);
                    kept_uncertainties.push(uncertainty);
                }
            }
            (kept_values, kept_uncertainties)
        } else {
            (screen_non_finite(values, None), uncertainties.to_vec())
        }
    } else {
        (values.to_vec(), uncertainties.to_vec())
    };

    if values.is_empty() {
        return (None, notes);
    }

    let mut sorted = values.clone();
    sorted.sort_by(f32::total_cmp);

    let median = median_of_sorted(&sorted);
    let lower = quantile_of_sorted(&sorted, lower_percentage / 100.0);
    let upper = quantile_of_sorted(&sorted, upper_percentage / 100.0);

    let median_uncertainty = if uncertainties.is_empty() {
        None
    } else if uncertainties.len() == 1 {
        debug!("single shared uncertainty: skipping the resampling experiments");
        notes.push(QualityNote::SingleUncertaintyShortcut);
        Some(uncertainties[0])
    } else if uncertainties.len() == values.len() {
        Some(resampled_median_spread(&values, &uncertainties, trials, rng))
    } else {
        notes.push(QualityNote::MismatchedUncertainties {
            values: values.len(),
            uncertainties: uncertainties.len(),
        });
        None
    };

    (
        Some(Quantiles {
            median,
            lower,
            upper,
            median_uncertainty,
        }),
        notes,
    )
}

/// Spread of the median across independent resampling experiments. Each
/// experiment redraws every value from `N(value, uncertainty)` and takes the
/// median; the experiments have no data dependency on each other.
fn resampled_median_spread(
    values: &[f32],
    uncertainties: &[f32],
    trials: usize,
    rng: &mut impl Rng,
) -> f32 {
    let medians: Vec<f32> = (0..trials)
        .map(|_| {
            let mut resample = gaussian_draw(values, uncertainties, rng);
            resample.sort_by(f32::total_cmp);
            median_of_sorted(&resample)
        })
        .collect();

    mean_variance_sd(&medians, false)
        .map(|stats| stats.standard_deviation)
        .unwrap_or(0.0)
}

/// Element-wise draw from `N(values[i], uncertainties[i])`. Lengths must
/// already match.
fn gaussian_draw(values: &[f32], uncertainties: &[f32], rng: &mut impl Rng) -> Vec<f32> {
    values
        .iter()
        .zip(uncertainties.iter())
        .map(|(&value, &uncertainty)| match Normal::new(value, uncertainty) {
            Ok(distribution) => distribution.sample(rng),
            Err(_) => value,
        })
        .collect()
}

/// Replace every value with a draw from a normal distribution centered on it,
/// with its paired uncertainty as standard deviation.
///
/// A length mismatch is reported as a note, and the original values come back
/// unchanged rather than aborting the caller's workflow.
pub fn inject_gaussian_noise(
    values: &[f32],
    uncertainties: &[f32],
    rng: &mut impl Rng,
) -> (Vec<f32>, Vec<QualityNote>) {
    if values.len() != uncertainties.len() {
        debug!(
            "number of values ({}) does not match the number of uncertainties ({}): input passed through",
            values.len(),
            uncertainties.len()
        );
        return (
            values.to_vec(),
            vec![QualityNote::MismatchedUncertainties {
                values: values.len(),
                uncertainties: uncertainties.len(),
            }],
        );
    }
    (gaussian_draw(values, uncertainties, rng), Vec::new())
}

/// The element of `values` closest to a probe value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NearestValue {
    pub index: usize,
    /// `values[index] - probe`: negative when the nearest value lies below
    /// the probe.
    pub difference: f32,
}

/// Find the value nearest to `probe`.
///
/// With `monotonic` the scan stops as soon as the distances start growing,
/// which is only valid for sorted input. Ties resolve to the last of the
/// equally-near values.
pub fn nearest_value(values: &[f32], probe: f32, monotonic: bool) -> Option<NearestValue> {
    if values.is_empty() {
        return None;
    }

    let mut best_index = 0;
    let mut best_distance = (values[0] - probe).abs();

    if monotonic {
        for (index, &value) in values.iter().enumerate().skip(1) {
            let distance = (value - probe).abs();
            if distance > best_distance {
                break;
            }
            best_distance = distance;
            best_index = index;
        }
    } else {
        for (index, &value) in values.iter().enumerate().skip(1) {
            let distance = (value - probe).abs();
            if distance <= best_distance {
                best_distance = distance;
                best_index = index;
            }
        }
    }

    Some(NearestValue {
        index: best_index,
        difference: values[best_index] - probe,
    })
}

/// Gaussian density of `N(mu, sigma)` sampled over `[mu - 5σ, mu + 5σ]` at a
/// step of `σ / 20`. Returns the sample points and the density values.
pub fn normal_distribution(mu: f32, sigma: f32) -> (Vec<f32>, Vec<f32>) {
    if !(sigma > 0.0) {
        debug!("normal distribution curve needs a positive sigma, got {sigma}");
        return (Vec::new(), Vec::new());
    }

    let constant = 1.0 / (sigma * (2.0 * PI).sqrt());
    let x: Vec<f32> = (-100..=100).map(|i| mu + i as f32 * sigma / 20.0).collect();
    let density = x
        .iter()
        .map(|&xi| {
            let z = (xi - mu) / sigma;
            constant * (-0.5 * z * z).exp()
        })
        .collect();
    (x, density)
}

/// Cumulative integral of the [`normal_distribution`] curve by trapezoid
/// accumulation over the same sample points.
pub fn cumulative_normal_distribution(mu: f32, sigma: f32) -> (Vec<f32>, Vec<f32>) {
    let (x, density) = normal_distribution(mu, sigma);
    if x.is_empty() {
        return (x, Vec::new());
    }

    let mut cumulative = Vec::with_capacity(x.len());
    cumulative.push(density[0]);
    for i in 1..x.len() - 1 {
        let step = (x[i] - x[i - 1]) * (density[i] + density[i - 1]) / 2.0;
        let previous = cumulative[i - 1];
        cumulative.push(previous + step);
    }
    let last = cumulative[cumulative.len() - 1];
    cumulative.push(last);

    (x, cumulative)
}
