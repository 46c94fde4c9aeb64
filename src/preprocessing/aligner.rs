use crate::domain::entities::Interval;
use crate::domain::errors::{PrepError, Result};

/// Dense per-sample phoneme ids plus the sample span of every interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub label: Vec<i64>,
    pub spans: Vec<(usize, usize)>,
}

fn to_sample(seconds: f64, fs: u32) -> usize {
    let s = (seconds * fs as f64).round();
    if s <= 0.0 { 0 } else { s as usize }
}

fn check_intervals(intervals: &[Interval]) -> Result<()> {
    let mut prev_end = f64::NEG_INFINITY;
    for (i, iv) in intervals.iter().enumerate() {
        if !iv.start_time.is_finite() || !iv.end_time.is_finite() {
            return Err(PrepError::invalid_argument(format!(
                "interval {i} has a non-finite boundary"
            )));
        }
        if iv.end_time < iv.start_time {
            return Err(PrepError::inconsistent(
                "aligner",
                format!(
                    "interval {i} ends before it starts ({} < {})",
                    iv.end_time, iv.start_time
                ),
            ));
        }
        if iv.start_time < prev_end {
            return Err(PrepError::inconsistent(
                "aligner",
                format!(
                    "interval {i} starts at {} before the previous one ends at {prev_end}",
                    iv.start_time
                ),
            ));
        }
        prev_end = iv.end_time;
    }
    Ok(())
}

/// Broadcasts each interval's phoneme id over its samples.
///
/// Times are taken relative to the first interval's start. The end index
/// is inclusive of one extra sample, and an end past `nsamples` is pulled
/// back to `nsamples - 1`, so a final interval that overruns never labels
/// the last sample. Contiguous intervals share one boundary sample, which
/// goes to the later interval.
pub fn align(intervals: &[Interval], nsamples: usize, fs: u32) -> Result<Alignment> {
    check_intervals(intervals)?;
    let mut label = vec![0i64; nsamples];
    let Some(first) = intervals.first() else {
        return Ok(Alignment {
            label,
            spans: Vec::new(),
        });
    };
    let offset = first.start_time;

    let mut spans = Vec::with_capacity(intervals.len());
    for iv in intervals {
        let start = to_sample(iv.start_time - offset, fs).min(nsamples);
        let mut end = to_sample(iv.end_time - offset, fs) + 1;
        if end > nsamples {
            end = nsamples.saturating_sub(1);
        }
        let start = start.min(end);
        label[start..end].fill(iv.phoneme_id);
        spans.push((start, end));
    }
    Ok(Alignment { label, spans })
}
