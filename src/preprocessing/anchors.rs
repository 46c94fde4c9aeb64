use crate::domain::entities::{AnchorPair, Interval};
use crate::domain::errors::{PrepError, Result};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Phoneme ids eligible for time-stretch anchoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VowelSet {
    ids: HashSet<i64>,
}

impl VowelSet {
    pub fn from_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        VowelSet {
            ids: ids.into_iter().collect(),
        }
    }

    /// Resolves vowel tokens against a token list, one token per line.
    ///
    /// The id of a token is its line index unless the line carries an
    /// explicit `token id` pair.
    pub fn from_token_list<S: AsRef<str>>(path: impl AsRef<Path>, vowels: &[S]) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| PrepError::io(format!("reading token list {}", path.display()), e))?;
        let mut table: HashMap<&str, i64> = HashMap::new();
        for (index, line) in contents.lines().enumerate() {
            let mut parts = line.split_whitespace();
            let Some(token) = parts.next() else { continue };
            let id = match parts.next() {
                Some(raw) => raw.parse::<i64>().map_err(|_| {
                    PrepError::invalid_argument(format!(
                        "token list {} line {}: bad id '{raw}'",
                        path.display(),
                        index + 1
                    ))
                })?,
                None => index as i64,
            };
            table.entry(token).or_insert(id);
        }
        Ok(Self::from_lookup(vowels, |t| table.get(t).copied()))
    }

    pub fn from_lookup<S: AsRef<str>>(vowels: &[S], lookup: impl Fn(&str) -> Option<i64>) -> Self {
        let ids = vowels
            .iter()
            .filter_map(|v| {
                let v = v.as_ref();
                let id = lookup(v);
                if id.is_none() {
                    warn!(token = v, "vowel token missing from token list, skipping");
                }
                id
            })
            .collect();
        VowelSet { ids }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Picks vowel intervals to stretch, each with probability one half.
///
/// `spans` are the sample spans produced by the aligner for `intervals`.
/// The result keeps interval order.
pub fn select_anchors<R: Rng + ?Sized>(
    intervals: &[Interval],
    spans: &[(usize, usize)],
    vowels: &VowelSet,
    phone_time_aug_factor: f64,
    rng: &mut R,
) -> Result<Vec<AnchorPair>> {
    if intervals.len() != spans.len() {
        return Err(PrepError::inconsistent(
            "anchor selection",
            format!("{} intervals but {} spans", intervals.len(), spans.len()),
        ));
    }
    if phone_time_aug_factor == 1.0 {
        return Ok(Vec::new());
    }
    let anchors: Vec<AnchorPair> = intervals
        .iter()
        .zip(spans)
        .filter(|(iv, _)| vowels.contains(iv.phoneme_id))
        .filter(|_| rng.random::<f64>() < 0.5)
        .map(|(iv, &(start, end))| AnchorPair {
            start,
            end,
            phoneme_id: iv.phoneme_id,
        })
        .collect();
    debug!(count = anchors.len(), "selected stretch anchors");
    Ok(anchors)
}
