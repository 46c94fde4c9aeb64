//! Keeps the symbolic streams and the audio the same length while vowels
//! are stretched.

use crate::domain::entities::{AnchorInsert, AnchorPair, InsertPlan, WarpPath};
use crate::domain::errors::{PrepError, Result};
use tracing::debug;

/// Label, pitch and tempo after duplicated samples are spliced in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedSequences {
    pub label: Vec<i64>,
    pub pitch: Option<Vec<i64>>,
    pub tempo: Option<Vec<i64>>,
}

pub fn insert_count(anchor: &AnchorPair, factor: f64) -> usize {
    let span = anchor.span();
    let stretched = (span as f64 * factor).floor();
    (stretched as usize).saturating_sub(span)
}

fn fill_value(seq: &[i64], index: usize, stream: &'static str) -> Result<i64> {
    let Some(last) = seq.len().checked_sub(1) else {
        return Err(PrepError::inconsistent(
            "synchronizer",
            format!("{stream} sequence is empty"),
        ));
    };
    Ok(seq[index.min(last)])
}

/// Resolves how many samples each anchor gains and what they hold.
///
/// Pitch and tempo fills are read at the anchor's end index, which may
/// equal the sequence length; the last element is used then.
pub fn plan_inserts(
    anchors: &[AnchorPair],
    factor: f64,
    pitch: Option<&[i64]>,
    tempo: Option<&[i64]>,
) -> Result<InsertPlan> {
    let inserts = anchors
        .iter()
        .map(|anchor| -> Result<AnchorInsert> {
            Ok(AnchorInsert {
                offset: anchor.end,
                count: insert_count(anchor, factor),
                label: anchor.phoneme_id,
                pitch: pitch.map(|p| fill_value(p, anchor.end, "pitch")).transpose()?,
                tempo: tempo.map(|t| fill_value(t, anchor.end, "tempo")).transpose()?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(InsertPlan { inserts })
}

/// Inserts every run before its original index in a single pass.
///
/// Offsets refer to `seq` as given, so earlier runs never shift later ones.
/// Runs must be ordered by offset.
pub fn insert_runs<T: Copy>(
    seq: &[T],
    runs: impl IntoIterator<Item = (usize, usize, T)>,
) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(seq.len());
    let mut cursor = 0usize;
    for (offset, count, value) in runs {
        if offset < cursor || offset > seq.len() {
            return Err(PrepError::inconsistent(
                "synchronizer",
                format!(
                    "insert offset {offset} out of order or beyond length {}",
                    seq.len()
                ),
            ));
        }
        out.extend_from_slice(&seq[cursor..offset]);
        out.extend(std::iter::repeat_n(value, count));
        cursor = offset;
    }
    out.extend_from_slice(&seq[cursor..]);
    Ok(out)
}

fn stream_runs(
    plan: &InsertPlan,
    pick: impl Fn(&AnchorInsert) -> Option<i64>,
) -> Result<Vec<(usize, usize, i64)>> {
    plan.inserts
        .iter()
        .map(|i| {
            pick(i).map(|v| (i.offset, i.count, v)).ok_or_else(|| {
                PrepError::inconsistent("synchronizer", "insert plan lacks a fill value")
            })
        })
        .collect()
}

pub fn apply_plan(
    label: &[i64],
    pitch: Option<&[i64]>,
    tempo: Option<&[i64]>,
    plan: &InsertPlan,
) -> Result<SyncedSequences> {
    let label = insert_runs(label, stream_runs(plan, |i| Some(i.label))?)?;
    let pitch = pitch
        .map(|p| insert_runs(p, stream_runs(plan, |i| i.pitch)?))
        .transpose()?;
    let tempo = tempo
        .map(|t| insert_runs(t, stream_runs(plan, |i| i.tempo)?))
        .transpose()?;
    Ok(SyncedSequences { label, pitch, tempo })
}

/// Builds the control points mapping original to stretched sample indices.
///
/// The accumulator of inserted samples is threaded through the anchors in
/// order; the path starts at `(0, 0)` and is closed at `nsamples` unless
/// the last anchor already ends there. An anchor's start point is emitted
/// only when it lies past the previous control point: contiguous intervals
/// share their boundary sample, so a vowel following a stretched vowel
/// starts one sample before the previous end.
pub fn build_warp_path(anchors: &[AnchorPair], plan: &InsertPlan, nsamples: usize) -> Result<WarpPath> {
    if anchors.len() != plan.inserts.len() {
        return Err(PrepError::inconsistent(
            "warp path",
            format!("{} anchors but {} inserts", anchors.len(), plan.inserts.len()),
        ));
    }
    let (mut path, acc, last_source) = anchors.iter().zip(plan.counts()).fold(
        (WarpPath::default(), 0usize, 0usize),
        |(mut path, acc, last_source), (anchor, count)| {
            if anchor.start > last_source {
                path.push_source(anchor.start);
                path.push_target(anchor.start + acc);
            }
            let acc = acc + count;
            path.push_source(anchor.end);
            path.push_target(anchor.end + acc);
            (path, acc, anchor.end)
        },
    );
    if last_source != nsamples {
        path.push_source(nsamples);
        path.push_target(nsamples + acc);
    }
    if !path.is_monotonic() {
        return Err(PrepError::inconsistent(
            "warp path",
            format!("control points are not monotonic: {:?}", path.source),
        ));
    }
    debug!(points = path.len(), inserted = acc, "built warp path");
    Ok(path)
}

/// Fails unless every present stream has `expected` samples.
pub fn verify_lengths(
    expected: usize,
    streams: &[(&'static str, Option<usize>)],
) -> Result<()> {
    for (name, len) in streams {
        if let Some(len) = len {
            if *len != expected {
                return Err(PrepError::inconsistent(
                    "length check",
                    format!("{name} has {len} samples, expected {expected}"),
                ));
            }
        }
    }
    Ok(())
}
