use serde::Serialize;
use thiserror::Error;

/// Recoverable configuration problems: the call did not run with the
/// requested parameters, and the caller can retry with corrected input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sampling frequency must be positive, got {0} Hz")]
    InvalidSamplingFrequency(f32),

    #[error("notch frequency {notch} Hz must lie strictly between 0 and the Nyquist frequency {nyquist} Hz")]
    NotchFrequencyOutOfRange { notch: f32, nyquist: f32 },

    #[error("quality factor must be positive, got {0}")]
    InvalidQualityFactor(f32),

    #[error("filter order must be at least 1")]
    InvalidOrder,

    #[error("{kind} filter expects {expected} cutoff value(s), got {got}")]
    CutoffArity {
        kind: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("cutoff frequencies {got:?} must lie strictly between 0 and the Nyquist frequency {nyquist} Hz, in increasing order")]
    CutoffOutOfRange { got: Vec<f32>, nyquist: f32 },

    #[error("filter has no coefficients; design it before applying")]
    MissingCoefficients,
}

/// Degenerate input, fatal for the call: there is no meaningful result to
/// return, and returning `NaN` as a disguised success is not an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DegenerateError {
    #[error("linear fit needs at least 3 finite points, got {0}")]
    TooFewPoints(usize),

    #[error("least-squares determinant vanished or is not finite (zero-variance x input)")]
    ZeroDeterminant,
}

/// Advisory notes attached to results. The operation completed, possibly
/// with auto-corrected parameters or a skipped refinement step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QualityNote {
    /// An even window width was bumped to the next odd value.
    WindowWidthAdjusted { requested: usize, used: usize },
    /// A window width of zero was rejected; the input passed through unchanged.
    WindowWidthRejected,
    /// A single shared uncertainty was used directly as the median
    /// uncertainty instead of running the resampling experiments.
    SingleUncertaintyShortcut,
    /// The uncertainty list does not pair up with the values; the
    /// uncertainty-dependent part of the result was skipped or the input
    /// was returned unchanged.
    MismatchedUncertainties { values: usize, uncertainties: usize },
}
