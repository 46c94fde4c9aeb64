//! Phoneme-to-sample alignment and time-synchronized augmentation for
//! singing voice synthesis training data.
//!
//! A [`Preprocessor`] expands phoneme intervals into a per-sample label
//! stream, optionally stretches randomly chosen vowels in the label, pitch,
//! tempo and audio streams alike, then perturbs the audio with reverb and
//! noise. Every stream it returns has the same length.

pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod preprocessing;

#[cfg(test)]
mod test_support;

pub use config::{AugmentationConfig, NoiseDbRange, PreprocessConfig, VadConfig};
pub use domain::entities::{
    AnchorPair, AudioSegment, Interval, MidiSequence, ProcessedUtterance, Utterance, WarpPath,
};
pub use domain::errors::{PrepError, Result};
pub use infrastructure::time_stretch::{TimeStretcher, Wsola};
pub use preprocessing::anchors::VowelSet;
pub use preprocessing::framing::{Window, detect_non_silence, frame};
pub use preprocessing::preprocessor::Preprocessor;
