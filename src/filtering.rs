use log::debug;
use rustfft::num_complex::Complex;
use sci_rs::signal::filter::{design::Sos, sosfiltfilt_dyn};
use serde::Serialize;
use std::f32::consts::PI;
use std::f64::consts::PI as PI64;

use crate::error::{ConfigError, QualityNote};

/// Number of points the frequency-response curve is evaluated at.
pub const RESPONSE_POINTS: usize = 512;

/// Default window width for [`median_filter`].
pub const DEFAULT_MEDIAN_WINDOW: usize = 3;

/// Output of the window filters: the filtered trace plus any advisory notes
/// about auto-corrected parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredSignal {
    pub samples: Vec<f32>,
    pub notes: Vec<QualityNote>,
}

/// Validate a window width: zero is rejected, an even width is bumped to the
/// next odd value.
fn checked_window_width(window_width: usize) -> (Option<usize>, Vec<QualityNote>) {
    if window_width == 0 {
        debug!("window width must be an odd number larger than 0; input passed through");
        return (None, vec![QualityNote::WindowWidthRejected]);
    }
    if window_width % 2 == 0 {
        let used = window_width + 1;
        debug!("window width must be an odd number: reset to {used} samples");
        return (
            Some(used),
            vec![QualityNote::WindowWidthAdjusted {
                requested: window_width,
                used,
            }],
        );
    }
    (Some(window_width), Vec::new())
}

/// Running-average filter over a window of `window_width` samples centered on
/// each element. Near the edges the average runs over the in-range samples
/// only, so the window is never padded with invented values.
///
/// The noise level of the filtered trace is the input noise level divided by
/// the square root of the window width.
pub fn running_average(samples: &[f32], window_width: usize) -> FilteredSignal {
    let (width, notes) = checked_window_width(window_width);
    let Some(width) = width else {
        return FilteredSignal {
            samples: samples.to_vec(),
            notes,
        };
    };
    let radius = width / 2;

    let mut filtered = Vec::with_capacity(samples.len());
    for i in 0..samples.len() {
        let start = i.saturating_sub(radius);
        let end = (i + radius + 1).min(samples.len());
        let window = &samples[start..end];
        filtered.push(window.iter().sum::<f32>() / window.len() as f32);
    }

    FilteredSignal {
        samples: filtered,
        notes,
    }
}

/// Sliding-median filter over an odd window ([`DEFAULT_MEDIAN_WINDOW`] is the
/// usual choice). Taps beyond either end of the trace read as zero, so
/// boundary outputs follow the zero-padded convention.
pub fn median_filter(samples: &[f32], window_width: usize) -> FilteredSignal {
    let (width, notes) = checked_window_width(window_width);
    let Some(width) = width else {
        return FilteredSignal {
            samples: samples.to_vec(),
            notes,
        };
    };
    let radius = width / 2;

    let mut filtered = Vec::with_capacity(samples.len());
    let mut window = Vec::with_capacity(width);
    for i in 0..samples.len() {
        window.clear();
        for tap in 0..width {
            let j = i as isize + tap as isize - radius as isize;
            if j >= 0 && (j as usize) < samples.len() {
                window.push(samples[j as usize]);
            } else {
                window.push(0.0);
            }
        }
        window.sort_by(f32::total_cmp);
        filtered.push(window[radius]);
    }

    FilteredSignal {
        samples: filtered,
        notes,
    }
}

/// One point of a filter's magnitude response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrequencyResponsePoint {
    pub frequency: f32,
    pub gain_db: f32,
}

/// IIR notch filter: designed once for a given sampling frequency, notch
/// frequency and quality factor, then applied zero-phase to any number of
/// traces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotchFilter {
    pub b: Vec<f32>,
    pub a: Vec<f32>,
    /// Magnitude response over `[0, fs/2)`.
    pub response: Vec<FrequencyResponsePoint>,
}

impl NotchFilter {
    /// Design a notch filter.
    ///
    /// - `quality_factor` characterizes the -3 dB bandwidth `bw` relative to
    ///   the notch frequency, `Q = w0 / bw`.
    ///
    /// The notch frequency must lie strictly between 0 and the Nyquist
    /// frequency.
    pub fn design(
        sampling_frequency: f32,
        notch_frequency: f32,
        quality_factor: f32,
    ) -> Result<Self, ConfigError> {
        if !(sampling_frequency > 0.0) {
            return Err(ConfigError::InvalidSamplingFrequency(sampling_frequency));
        }
        if !(quality_factor > 0.0) {
            return Err(ConfigError::InvalidQualityFactor(quality_factor));
        }

        // Normalized frequency, 1.0 at Nyquist.
        let w0 = 2.0 * notch_frequency / sampling_frequency;
        if !(w0 > 0.0 && w0 < 1.0) {
            return Err(ConfigError::NotchFrequencyOutOfRange {
                notch: notch_frequency,
                nyquist: sampling_frequency / 2.0,
            });
        }

        let bandwidth = w0 / quality_factor * PI;
        let w0 = w0 * PI;

        let beta = (bandwidth / 2.0).tan();
        let gain = 1.0 / (1.0 + beta);

        let b: Vec<f32> = [1.0, -2.0 * w0.cos(), 1.0]
            .iter()
            .map(|x| x * gain)
            .collect();
        let a = vec![1.0, -2.0 * gain * w0.cos(), 2.0 * gain - 1.0];

        let response = frequency_response(&b, &a, sampling_frequency, RESPONSE_POINTS);

        debug!(
            "designed notch filter at {notch_frequency} Hz (Q = {quality_factor}, fs = {sampling_frequency} Hz)"
        );

        Ok(NotchFilter { b, a, response })
    }

    /// Apply the filter zero-phase (forward then backward), so the output has
    /// no net phase or group delay relative to the input.
    pub fn apply(&self, samples: &[f32]) -> Result<Vec<f32>, ConfigError> {
        if self.b.len() < 3 || self.a.len() < 3 {
            return Err(ConfigError::MissingCoefficients);
        }
        let sos = tf2sos(&self.b, &self.a);
        Ok(sosfiltfilt_dyn(samples.iter(), &sos))
    }
}

/// Convert second-order transfer function coefficients to a single SOS
/// section, normalized so a0 = 1.
fn tf2sos(b: &[f32], a: &[f32]) -> Vec<Sos<f32>> {
    vec![Sos::new(
        [b[0] / a[0], b[1] / a[0], b[2] / a[0]],
        [1.0, a[1] / a[0], a[2] / a[0]],
    )]
}

/// Magnitude response of the digital filter `b / a` at `points` frequencies
/// spanning `[0, fs/2)`.
fn frequency_response(
    b: &[f32],
    a: &[f32],
    sampling_frequency: f32,
    points: usize,
) -> Vec<FrequencyResponsePoint> {
    let mut response = Vec::with_capacity(points);
    for i in 0..points {
        let omega = PI * i as f32 / points as f32;
        let z = Complex::from_polar(1.0, -omega);
        let gain = (polyval(b, z) / polyval(a, z)).norm();
        response.push(FrequencyResponsePoint {
            frequency: omega * sampling_frequency / (2.0 * PI),
            gain_db: 20.0 * gain.log10(),
        });
    }
    response
}

/// Evaluate a polynomial in ascending powers of `z`.
fn polyval(coefficients: &[f32], z: Complex<f32>) -> Complex<f32> {
    let mut value = Complex::new(0.0, 0.0);
    let mut zpow = Complex::new(1.0, 0.0);
    for &coefficient in coefficients {
        value += zpow * coefficient;
        zpow *= z;
    }
    value
}

/// Butterworth band type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BandKind {
    Lowpass,
    Highpass,
    Bandstop,
}

impl BandKind {
    fn name(self) -> &'static str {
        match self {
            BandKind::Lowpass => "lowpass",
            BandKind::Highpass => "highpass",
            BandKind::Bandstop => "bandstop",
        }
    }
}

/// Butterworth filter as a cascade of second-order sections, the numerically
/// stable representation for higher orders.
#[derive(Debug, Clone)]
pub struct BandFilter {
    pub kind: BandKind,
    pub order: usize,
    pub sections: Vec<Sos<f32>>,
}

impl BandFilter {
    /// Design a Butterworth filter of the given order.
    ///
    /// `cutoff` holds one frequency for `Lowpass`/`Highpass` and the
    /// `[low, high]` band edges for `Bandstop`; any other arity is a
    /// configuration error. The design runs through the analog prototype,
    /// the band transform and the bilinear transform, and pairs the
    /// resulting poles and zeros into real second-order sections.
    pub fn design(
        sampling_frequency: f32,
        kind: BandKind,
        order: usize,
        cutoff: &[f32],
    ) -> Result<Self, ConfigError> {
        if !(sampling_frequency > 0.0) {
            return Err(ConfigError::InvalidSamplingFrequency(sampling_frequency));
        }
        if order == 0 {
            return Err(ConfigError::InvalidOrder);
        }

        let expected = match kind {
            BandKind::Bandstop => 2,
            _ => 1,
        };
        if cutoff.len() != expected {
            return Err(ConfigError::CutoffArity {
                kind: kind.name(),
                expected,
                got: cutoff.len(),
            });
        }

        let nyquist = sampling_frequency / 2.0;
        let ordered = cutoff.windows(2).all(|pair| pair[0] < pair[1]);
        if cutoff.iter().any(|&f| !(f > 0.0 && f < nyquist)) || !ordered {
            return Err(ConfigError::CutoffOutOfRange {
                got: cutoff.to_vec(),
                nyquist,
            });
        }

        // Pre-warp the band edges for the bilinear transform.
        let warped: Vec<f64> = cutoff
            .iter()
            .map(|&f| (PI64 * f as f64 / sampling_frequency as f64).tan())
            .collect();

        let (zeros, poles, gain) = match kind {
            BandKind::Lowpass => lowpass_zpk(order, warped[0]),
            BandKind::Highpass => highpass_zpk(order, warped[0]),
            BandKind::Bandstop => bandstop_zpk(order, warped[0], warped[1]),
        };
        let (zeros, poles, gain) = bilinear_zpk(zeros, poles, gain);
        let sections = zpk_to_sos(&zeros, &poles, gain);

        debug!(
            "designed order-{order} {} filter at {cutoff:?} Hz ({} sections, fs = {sampling_frequency} Hz)",
            kind.name(),
            sections.len()
        );

        Ok(BandFilter {
            kind,
            order,
            sections,
        })
    }

    /// Apply the filter zero-phase (forward then backward).
    pub fn apply(&self, samples: &[f32]) -> Result<Vec<f32>, ConfigError> {
        if self.sections.is_empty() {
            return Err(ConfigError::MissingCoefficients);
        }
        Ok(sosfiltfilt_dyn(samples.iter(), &self.sections))
    }
}

/// Poles of the analog Butterworth prototype: evenly spaced on the left half
/// of the unit circle.
fn butterworth_prototype(order: usize) -> Vec<Complex<f64>> {
    (0..order)
        .map(|k| {
            let angle = PI64 * (2 * k + 1) as f64 / (2 * order) as f64;
            Complex::new(-angle.sin(), angle.cos())
        })
        .collect()
}

type Zpk = (Vec<Complex<f64>>, Vec<Complex<f64>>, f64);

/// Scale the prototype to the warped cutoff `w`.
fn lowpass_zpk(order: usize, w: f64) -> Zpk {
    let poles: Vec<Complex<f64>> = butterworth_prototype(order)
        .into_iter()
        .map(|p| p * w)
        .collect();
    (Vec::new(), poles, w.powi(order as i32))
}

/// Invert the prototype around the warped cutoff `w`. The prototype's pole
/// product is 1, so the gain is unchanged.
fn highpass_zpk(order: usize, w: f64) -> Zpk {
    let poles: Vec<Complex<f64>> = butterworth_prototype(order)
        .iter()
        .map(|p| Complex::new(w, 0.0) / p)
        .collect();
    let zeros = vec![Complex::new(0.0, 0.0); order];
    (zeros, poles, 1.0)
}

/// Band-stop transform `s -> bw * s / (s^2 + w0^2)`: every prototype pole
/// maps to a pair of poles, and the prototype's zeros at infinity land as
/// conjugate pairs on the stop-band center `±j w0`.
fn bandstop_zpk(order: usize, w_low: f64, w_high: f64) -> Zpk {
    let w0 = (w_low * w_high).sqrt();
    let bandwidth = w_high - w_low;

    let mut poles = Vec::with_capacity(2 * order);
    for p in butterworth_prototype(order) {
        let half = Complex::new(bandwidth / 2.0, 0.0) / p;
        let discriminant = (half * half - Complex::new(w0 * w0, 0.0)).sqrt();
        poles.push(half + discriminant);
        poles.push(half - discriminant);
    }

    let mut zeros = Vec::with_capacity(2 * order);
    for _ in 0..order {
        zeros.push(Complex::new(0.0, w0));
        zeros.push(Complex::new(0.0, -w0));
    }

    (zeros, poles, 1.0)
}

/// Map analog zeros and poles to the z-plane with `z = (1 + s) / (1 - s)`.
/// Zeros at infinity land at z = -1.
fn bilinear_zpk(zeros: Vec<Complex<f64>>, poles: Vec<Complex<f64>>, gain: f64) -> Zpk {
    let one = Complex::new(1.0, 0.0);

    let numerator = zeros.iter().fold(one, |acc, z| acc * (one - z));
    let denominator = poles.iter().fold(one, |acc, p| acc * (one - p));
    let gain = gain * (numerator / denominator).re;

    let mut mapped_zeros: Vec<Complex<f64>> =
        zeros.iter().map(|z| (one + z) / (one - z)).collect();
    let mapped_poles: Vec<Complex<f64>> = poles.iter().map(|p| (one + p) / (one - p)).collect();

    while mapped_zeros.len() < mapped_poles.len() {
        mapped_zeros.push(Complex::new(-1.0, 0.0));
    }

    (mapped_zeros, mapped_poles, gain)
}

/// Group roots into conjugate pairs (or pairs of reals, or a trailing single
/// real), ready to expand into real quadratics.
fn conjugate_pairs(roots: &[Complex<f64>]) -> Vec<Vec<Complex<f64>>> {
    let tolerance = 1e-10;

    let mut pairs: Vec<Vec<Complex<f64>>> = roots
        .iter()
        .filter(|r| r.im > tolerance)
        .map(|&r| vec![r, r.conj()])
        .collect();

    let mut reals: Vec<f64> = roots
        .iter()
        .filter(|r| r.im.abs() <= tolerance)
        .map(|r| r.re)
        .collect();
    reals.sort_by(f64::total_cmp);
    for chunk in reals.chunks(2) {
        pairs.push(chunk.iter().map(|&re| Complex::new(re, 0.0)).collect());
    }

    pairs
}

/// Monic quadratic (or linear) coefficients from one or two roots.
fn quadratic(roots: &[Complex<f64>]) -> (f64, f64, f64) {
    match roots {
        [root] => (1.0, -root.re, 0.0),
        [first, second] => (1.0, -(first + second).re, (first * second).re),
        _ => (1.0, 0.0, 0.0),
    }
}

/// Pair up zero and pole quadratics into second-order sections, applying the
/// overall gain to the first section's numerator.
fn zpk_to_sos(zeros: &[Complex<f64>], poles: &[Complex<f64>], gain: f64) -> Vec<Sos<f32>> {
    let zero_pairs = conjugate_pairs(zeros);
    let pole_pairs = conjugate_pairs(poles);

    let count = zero_pairs.len().max(pole_pairs.len());
    let mut sections = Vec::with_capacity(count);
    for i in 0..count {
        let (b0, b1, b2) = zero_pairs
            .get(i)
            .map(|pair| quadratic(pair))
            .unwrap_or((1.0, 0.0, 0.0));
        let (_, a1, a2) = pole_pairs
            .get(i)
            .map(|pair| quadratic(pair))
            .unwrap_or((1.0, 0.0, 0.0));
        let section_gain = if i == 0 { gain } else { 1.0 };
        sections.push(Sos::new(
            [
                (section_gain * b0) as f32,
                (section_gain * b1) as f32,
                (section_gain * b2) as f32,
            ],
            [1.0, a1 as f32, a2 as f32],
        ));
    }
    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|&s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    fn sine(frequency: f32, sampling_frequency: f32, length: usize) -> Vec<f32> {
        (0..length)
            .map(|i| (2.0 * PI * frequency * i as f32 / sampling_frequency).sin())
            .collect()
    }

    #[test]
    fn running_average_width_one_is_identity() {
        let samples = [3.0, -1.0, 4.0, -1.5, 5.0];
        let result = running_average(&samples, 1);
        assert_eq!(result.samples, samples.to_vec());
        assert!(result.notes.is_empty());
    }

    #[test]
    fn running_average_uses_in_range_samples_at_the_edges() {
        let result = running_average(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        let expected = [1.5, 2.0, 3.0, 4.0, 4.5];
        for (&got, &want) in result.samples.iter().zip(&expected) {
            assert_abs_diff_eq!(got, want, epsilon = 1e-6);
        }
    }

    #[test]
    fn even_window_width_is_bumped_with_a_note() {
        let result = running_average(&[1.0, 2.0, 3.0, 4.0, 5.0], 4);
        assert_eq!(
            result.notes,
            vec![QualityNote::WindowWidthAdjusted {
                requested: 4,
                used: 5
            }]
        );
    }

    #[test]
    fn zero_window_width_passes_the_input_through() {
        let samples = [1.0, 2.0, 3.0];
        let result = median_filter(&samples, 0);
        assert_eq!(result.samples, samples.to_vec());
        assert_eq!(result.notes, vec![QualityNote::WindowWidthRejected]);
    }

    #[test]
    fn median_filter_width_one_is_identity() {
        let samples = [9.0, 1.0, 8.0, 2.0];
        assert_eq!(median_filter(&samples, 1).samples, samples.to_vec());
    }

    #[test]
    fn median_filter_zero_pads_the_boundaries() {
        let result = median_filter(&[1.0, 9.0, 1.0, 9.0, 1.0], DEFAULT_MEDIAN_WINDOW);
        assert_eq!(result.samples, vec![1.0, 1.0, 9.0, 1.0, 1.0]);
    }

    #[test]
    fn median_filter_suppresses_a_spike() {
        let result = median_filter(&[5.0, 5.0, 500.0, 5.0, 5.0], 3);
        assert_eq!(result.samples[2], 5.0);
    }

    #[test]
    fn notch_response_dips_at_the_notch_frequency() {
        let filter = NotchFilter::design(1000.0, 50.0, 2.0).unwrap();
        let deepest = filter
            .response
            .iter()
            .min_by(|a, b| a.gain_db.total_cmp(&b.gain_db))
            .unwrap();
        assert_abs_diff_eq!(deepest.frequency, 50.0, epsilon = 2.0);
        // Far from the notch the filter is transparent.
        let dc = &filter.response[0];
        assert_abs_diff_eq!(dc.gain_db, 0.0, epsilon = 0.5);
    }

    #[test]
    fn notch_attenuates_the_notched_tone_and_passes_the_rest() {
        let fs = 1000.0;
        let filter = NotchFilter::design(fs, 50.0, 2.0).unwrap();

        let hum = sine(50.0, fs, 2000);
        let filtered = filter.apply(&hum).unwrap();
        assert!(rms(&filtered[500..1500]) < 0.2 * rms(&hum[500..1500]));

        let slow = sine(2.0, fs, 2000);
        let passed = filter.apply(&slow).unwrap();
        assert!(rms(&passed[500..1500]) > 0.8 * rms(&slow[500..1500]));
    }

    #[test]
    fn notch_design_rejects_bad_frequencies() {
        assert!(matches!(
            NotchFilter::design(0.0, 50.0, 2.0),
            Err(ConfigError::InvalidSamplingFrequency(_))
        ));
        assert!(matches!(
            NotchFilter::design(100.0, 60.0, 2.0),
            Err(ConfigError::NotchFrequencyOutOfRange { .. })
        ));
        assert!(matches!(
            NotchFilter::design(100.0, 10.0, 0.0),
            Err(ConfigError::InvalidQualityFactor(_))
        ));
    }

    #[test]
    fn applying_without_coefficients_is_a_configuration_error() {
        let filter = NotchFilter {
            b: Vec::new(),
            a: Vec::new(),
            response: Vec::new(),
        };
        assert_eq!(
            filter.apply(&[1.0, 2.0]),
            Err(ConfigError::MissingCoefficients)
        );
    }

    #[test]
    fn lowpass_passes_dc_and_attenuates_high_frequencies() {
        let fs = 200.0;
        let filter = BandFilter::design(fs, BandKind::Lowpass, 4, &[10.0]).unwrap();

        let constant = vec![2.5; 1000];
        let smoothed = filter.apply(&constant).unwrap();
        for &sample in &smoothed[250..750] {
            assert_abs_diff_eq!(sample, 2.5, epsilon = 1e-3);
        }

        let fast = sine(60.0, fs, 1000);
        let attenuated = filter.apply(&fast).unwrap();
        assert!(rms(&attenuated[250..750]) < 0.05 * rms(&fast[250..750]));
    }

    #[test]
    fn highpass_removes_dc() {
        let filter = BandFilter::design(200.0, BandKind::Highpass, 4, &[10.0]).unwrap();
        let constant = vec![2.5; 1000];
        let filtered = filter.apply(&constant).unwrap();
        for &sample in &filtered[250..750] {
            assert_abs_diff_eq!(sample, 0.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn bandstop_notches_the_band_and_passes_dc() {
        let fs = 1000.0;
        let filter = BandFilter::design(fs, BandKind::Bandstop, 4, &[40.0, 60.0]).unwrap();

        let constant = vec![1.0; 2000];
        let passed = filter.apply(&constant).unwrap();
        for &sample in &passed[500..1500] {
            assert_abs_diff_eq!(sample, 1.0, epsilon = 1e-2);
        }

        let hum = sine(50.0, fs, 2000);
        let stopped = filter.apply(&hum).unwrap();
        assert!(rms(&stopped[500..1500]) < 0.05 * rms(&hum[500..1500]));
    }

    #[test]
    fn odd_order_designs_are_accepted() {
        let fs = 200.0;
        let filter = BandFilter::design(fs, BandKind::Lowpass, 5, &[10.0]).unwrap();
        assert_eq!(filter.sections.len(), 3);

        let constant = vec![1.0; 1000];
        let smoothed = filter.apply(&constant).unwrap();
        for &sample in &smoothed[250..750] {
            assert_abs_diff_eq!(sample, 1.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn cutoff_arity_is_checked_at_design_time() {
        assert!(matches!(
            BandFilter::design(200.0, BandKind::Lowpass, 4, &[10.0, 20.0]),
            Err(ConfigError::CutoffArity {
                kind: "lowpass",
                expected: 1,
                got: 2
            })
        ));
        assert!(matches!(
            BandFilter::design(200.0, BandKind::Bandstop, 4, &[10.0]),
            Err(ConfigError::CutoffArity {
                kind: "bandstop",
                expected: 2,
                got: 1
            })
        ));
        assert!(matches!(
            BandFilter::design(200.0, BandKind::Bandstop, 4, &[60.0, 40.0]),
            Err(ConfigError::CutoffOutOfRange { .. })
        ));
    }

    #[test]
    fn filters_are_pure() {
        let filter = BandFilter::design(200.0, BandKind::Lowpass, 4, &[10.0]).unwrap();
        let samples = sine(3.0, 200.0, 400);
        assert_eq!(
            filter.apply(&samples).unwrap(),
            filter.apply(&samples).unwrap()
        );
    }
}
