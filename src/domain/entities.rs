use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioSegment {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        AudioSegment { samples, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }
}

/// One annotated phoneme, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start_time: f64,
    pub end_time: f64,
    pub phoneme_id: i64,
}

impl Interval {
    pub fn new(start_time: f64, end_time: f64, phoneme_id: i64) -> Self {
        Interval {
            start_time,
            end_time,
            phoneme_id,
        }
    }
}

/// Pitch and tempo ids, one per sample, derived from the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MidiSequence {
    pub pitch: Vec<i64>,
    pub tempo: Vec<i64>,
}

/// Input record for a single utterance.
#[derive(Debug, Clone, Default)]
pub struct Utterance {
    pub uid: String,
    pub intervals: Option<Vec<Interval>>,
    pub midi: Option<MidiSequence>,
    pub singing: Option<AudioSegment>,
    /// Token ids from the upstream tokenizer, passed through untouched.
    pub text: Option<Vec<i64>>,
}

/// Output record. Every present sequence has the same length.
#[derive(Debug, Clone, Default)]
pub struct ProcessedUtterance {
    pub uid: String,
    pub text: Option<Vec<i64>>,
    pub label: Option<Vec<i64>>,
    pub pitch: Option<Vec<i64>>,
    pub tempo: Option<Vec<i64>>,
    pub singing: Option<AudioSegment>,
    pub anchors: Vec<AnchorPair>,
}

/// Sample span `[start, end)` of a vowel selected for stretching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnchorPair {
    pub start: usize,
    pub end: usize,
    pub phoneme_id: i64,
}

impl AnchorPair {
    pub fn span(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

/// Duplicates to splice in for one anchor, before original index `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorInsert {
    pub offset: usize,
    pub count: usize,
    pub label: i64,
    pub pitch: Option<i64>,
    pub tempo: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertPlan {
    pub inserts: Vec<AnchorInsert>,
}

impl InsertPlan {
    pub fn total(&self) -> usize {
        self.inserts.iter().map(|i| i.count).sum()
    }

    pub fn counts(&self) -> impl Iterator<Item = usize> + '_ {
        self.inserts.iter().map(|i| i.count)
    }

    pub fn is_noop(&self) -> bool {
        self.total() == 0
    }
}

/// Piecewise-linear map from original to stretched sample index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarpPath {
    pub source: Vec<usize>,
    pub target: Vec<usize>,
}

impl Default for WarpPath {
    fn default() -> Self {
        WarpPath {
            source: vec![0],
            target: vec![0],
        }
    }
}

impl WarpPath {
    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn push_source(&mut self, index: usize) {
        self.source.push(index);
    }

    pub fn push_target(&mut self, index: usize) {
        self.target.push(index);
    }

    pub fn points(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.source.iter().copied().zip(self.target.iter().copied())
    }

    /// Length of the stretched signal.
    pub fn output_len(&self) -> usize {
        self.target.last().copied().unwrap_or(0)
    }

    pub fn is_monotonic(&self) -> bool {
        self.source.len() == self.target.len()
            && self.points().zip(self.points().skip(1)).all(|((s0, t0), (s1, t1))| {
                s1 >= s0 && t1 >= t0 && (t1 - t0) >= (s1 - s0)
            })
    }
}
