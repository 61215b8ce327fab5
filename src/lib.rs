//! Numerical analysis of noisy, wiggling amplitude traces.
//!
//! The crate decomposes a trace into monotonic amplitude segments
//! ([`segment_analysis`]), cleans traces up with window and IIR filters
//! ([`filtering`]), computes robust summary statistics with Monte-Carlo
//! uncertainty propagation ([`robust_stats`]) and fits straight lines by
//! least squares ([`line_fitting`]).
//!
//! Every operation is a pure function (or a method on plain coefficient
//! data) over an in-memory sample sequence: no I/O, no shared state between
//! calls. Recoverable problems come back as [`error::ConfigError`] or as
//! advisory [`error::QualityNote`]s attached to the result; degenerate input
//! is an explicit [`error::DegenerateError`], never a `NaN` dressed up as a
//! result. Randomized operations take a caller-supplied `rand::Rng`, so they
//! are seedable for deterministic tests.

pub mod error;
pub mod filtering;
pub mod line_fitting;
pub mod robust_stats;
pub mod segment_analysis;
