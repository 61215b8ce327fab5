use log::debug;
use serde::Serialize;
use std::cmp::Ordering;

/// Trend of a segment between two turning points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SegmentDirection {
    Rising,
    Falling,
    /// Only produced when the remaining trace is completely flat.
    Flat,
}

/// A maximal monotonic run of the trace, from one local extremum to the next.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Segment {
    /// Sample index of the extremum the run starts at.
    pub start_index: usize,
    /// Net amplitude change over the run, in ADU.
    pub amplitude: i32,
    /// `amplitude / duration`, in ADU per time sample.
    pub slope: f32,
    /// Number of time samples between the bounding extrema.
    pub duration: usize,
    pub direction: SegmentDirection,
}

/// The rising or falling subset of a segment decomposition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SegmentSubset {
    pub count: usize,
    pub start_indices: Vec<usize>,
    /// Index of the steepest segment of this subset within the full segment
    /// list, `None` when the subset is empty. Ties go to the first occurrence.
    pub steepest_segment: Option<usize>,
    /// The same segment as an index into `start_indices`.
    pub steepest_in_subset: Option<usize>,
}

/// Full decomposition of a trace into monotonic segments.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SegmentSummary {
    pub count: usize,
    pub segments: Vec<Segment>,
    pub rising: SegmentSubset,
    pub falling: SegmentSubset,
}

/// Round to the ADU grid and clip to the 16-bit converter domain.
fn quantize(value: f32) -> i32 {
    value.round().clamp(i16::MIN as f32, i16::MAX as f32) as i32
}

/// Decompose a trace into monotonic amplitude segments.
///
/// Consecutive sample differences are scanned left to right. A delta whose
/// sign matches the open run's accumulated amplitude extends the run; a sign
/// flip closes it and seeds the next one. A zero delta never splits a run,
/// and a run that is still at amplitude zero absorbs the first nonzero delta,
/// so a flat lead-in merges into the trend that follows it.
///
/// Traces shorter than two samples produce an empty summary; a completely
/// flat trace produces a single zero-amplitude segment spanning its length.
pub fn extract_segments(samples: &[f32]) -> SegmentSummary {
    if samples.len() < 2 {
        return SegmentSummary::default();
    }

    let quantized: Vec<i32> = samples.iter().map(|&v| quantize(v)).collect();

    // Closed runs as (start index, accumulated amplitude).
    let mut runs: Vec<(usize, i32)> = Vec::new();
    let mut start = 0usize;
    let mut amplitude = quantized[1] - quantized[0];

    for i in 1..quantized.len() - 1 {
        let delta = quantized[i + 1] - quantized[i];
        if (amplitude >= 0 && delta >= 0) || (amplitude <= 0 && delta <= 0) {
            amplitude += delta;
        } else {
            runs.push((start, amplitude));
            start = i;
            amplitude = delta;
        }
    }
    runs.push((start, amplitude));

    let mut segments = Vec::with_capacity(runs.len());
    for (index, &(start, amplitude)) in runs.iter().enumerate() {
        // A run ends where the next one starts; the last one ends at the
        // final sample.
        let end = runs
            .get(index + 1)
            .map(|&(next_start, _)| next_start)
            .unwrap_or(samples.len() - 1);
        let duration = end - start;
        let direction = match amplitude.cmp(&0) {
            Ordering::Greater => SegmentDirection::Rising,
            Ordering::Less => SegmentDirection::Falling,
            Ordering::Equal => SegmentDirection::Flat,
        };
        segments.push(Segment {
            start_index: start,
            amplitude,
            slope: amplitude as f32 / duration as f32,
            duration,
            direction,
        });
    }

    let rising = collect_subset(&segments, SegmentDirection::Rising);
    let falling = collect_subset(&segments, SegmentDirection::Falling);

    debug!(
        "decomposed {} samples into {} segments ({} rising, {} falling)",
        samples.len(),
        segments.len(),
        rising.count,
        falling.count
    );

    SegmentSummary {
        count: segments.len(),
        segments,
        rising,
        falling,
    }
}

fn collect_subset(segments: &[Segment], direction: SegmentDirection) -> SegmentSubset {
    let mut subset = SegmentSubset::default();
    let mut steepest_slope: Option<f32> = None;

    for (global_index, segment) in segments.iter().enumerate() {
        if segment.direction != direction {
            continue;
        }

        let steeper = match (steepest_slope, direction) {
            (None, _) => true,
            (Some(best), SegmentDirection::Rising) => segment.slope > best,
            (Some(best), SegmentDirection::Falling) => segment.slope < best,
            (Some(_), SegmentDirection::Flat) => false,
        };
        if steeper {
            steepest_slope = Some(segment.slope);
            subset.steepest_segment = Some(global_index);
            subset.steepest_in_subset = Some(subset.count);
        }

        subset.start_indices.push(segment.start_index);
        subset.count += 1;
    }

    subset
}
