use crate::config::PreprocessConfig;
use crate::domain::entities::{AnchorPair, InsertPlan, ProcessedUtterance, Utterance};
use crate::domain::errors::{PrepError, Result};
use crate::infrastructure::augmentation::{Perturbation, normalize_volume};
use crate::infrastructure::time_stretch::{TimeStretcher, Wsola};
use crate::preprocessing::aligner::align;
use crate::preprocessing::anchors::{VowelSet, select_anchors};
use crate::preprocessing::synchronizer::{apply_plan, build_warp_path, plan_inserts, verify_lengths};
use rand::RngCore;
use tracing::{debug, warn};

/// Turns one annotated utterance into length-aligned training streams.
///
/// Holds no per-utterance state; randomness comes from the caller's rng.
pub struct Preprocessor {
    config: PreprocessConfig,
    vowels: VowelSet,
    perturbation: Perturbation,
    stretcher: Box<dyn TimeStretcher>,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig, vowels: VowelSet) -> Result<Self> {
        config.validate()?;
        let perturbation = if config.train {
            Perturbation::from_config(&config.augmentation, config.vad)?
        } else {
            Perturbation::new(Vec::new())
        };
        debug!(
            vowels = vowels.len(),
            augmentations = ?perturbation.names(),
            train = config.train,
            "preprocessor ready"
        );
        Ok(Preprocessor {
            config,
            vowels,
            perturbation,
            stretcher: Box::new(Wsola::default()),
        })
    }

    /// Resolves the vowel ids through the configured token list.
    pub fn from_config(config: PreprocessConfig) -> Result<Self> {
        let vowels = match &config.token_list {
            Some(path) => VowelSet::from_token_list(path, &config.vowels)?,
            None => {
                warn!("no token_list configured, phone-level time augmentation is disabled");
                VowelSet::default()
            }
        };
        Self::new(config, vowels)
    }

    pub fn with_stretcher(mut self, stretcher: Box<dyn TimeStretcher>) -> Self {
        self.stretcher = stretcher;
        self
    }

    pub fn process(
        &self,
        utterance: Utterance,
        phone_time_aug_factor: f64,
        rng: &mut dyn RngCore,
    ) -> Result<ProcessedUtterance> {
        if !phone_time_aug_factor.is_finite() || phone_time_aug_factor < 1.0 {
            return Err(PrepError::invalid_argument(format!(
                "phone_time_aug_factor must be >= 1, got {phone_time_aug_factor}"
            )));
        }
        let Utterance {
            uid,
            intervals,
            midi,
            singing,
            text,
        } = utterance;
        let (pitch, tempo) = midi.map(|m| (m.pitch, m.tempo)).unzip();
        if let (Some(p), Some(t)) = (&pitch, &tempo) {
            if p.len() != t.len() {
                return Err(PrepError::inconsistent(
                    "midi",
                    format!("pitch has {} values but tempo has {}", p.len(), t.len()),
                ));
            }
        }

        let mut out = ProcessedUtterance {
            uid,
            text,
            ..Default::default()
        };
        let mut anchors: Vec<AnchorPair> = Vec::new();
        let mut plan = InsertPlan::default();
        let mut label_len = None;

        match intervals {
            Some(intervals) => {
                let nsamples = pitch
                    .as_ref()
                    .map(Vec::len)
                    .or_else(|| singing.as_ref().map(|s| s.len()))
                    .ok_or_else(|| {
                        PrepError::invalid_argument("label intervals need midi or singing to size them")
                    })?;
                let alignment = align(&intervals, nsamples, self.config.fs)?;
                anchors = select_anchors(
                    &intervals,
                    &alignment.spans,
                    &self.vowels,
                    phone_time_aug_factor,
                    &mut *rng,
                )?;
                plan = plan_inserts(&anchors, phone_time_aug_factor, pitch.as_deref(), tempo.as_deref())?;
                let synced = apply_plan(&alignment.label, pitch.as_deref(), tempo.as_deref(), &plan)?;
                out.label = Some(synced.label);
                out.pitch = synced.pitch;
                out.tempo = synced.tempo;
                label_len = Some(nsamples);
            }
            None => {
                out.pitch = pitch;
                out.tempo = tempo;
            }
        }

        if let Some(mut singing) = singing {
            if singing.sample_rate != self.config.fs {
                warn!(
                    uid = %out.uid,
                    sample_rate = singing.sample_rate,
                    fs = self.config.fs,
                    "singing sample rate differs from the label rate"
                );
            }
            if !plan.is_noop() {
                if let Some(expected) = label_len {
                    verify_lengths(expected, &[("singing", Some(singing.len()))])?;
                }
                let path = build_warp_path(&anchors, &plan, singing.len())?;
                singing.samples = self.stretcher.stretch(&singing.samples, &path)?;
                debug!(
                    uid = %out.uid,
                    stretcher = self.stretcher.name(),
                    points = path.len(),
                    len = singing.len(),
                    "stretched singing"
                );
            }
            if self.config.train && !self.perturbation.is_empty() {
                singing = self.perturbation.apply(&singing, rng)?;
            }
            if let Some(level) = self.config.augmentation.singing_volume_normalize {
                normalize_volume(&mut singing, level);
            }
            out.singing = Some(singing);
        }

        check_output(&out)?;
        debug!(
            uid = %out.uid,
            anchors = anchors.len(),
            inserted = plan.total(),
            "processed utterance"
        );
        out.anchors = anchors;
        Ok(out)
    }
}

fn check_output(out: &ProcessedUtterance) -> Result<()> {
    let streams = [
        ("label", out.label.as_ref().map(Vec::len)),
        ("pitch", out.pitch.as_ref().map(Vec::len)),
        ("tempo", out.tempo.as_ref().map(Vec::len)),
        ("singing", out.singing.as_ref().map(|s| s.len())),
    ];
    match streams.iter().find_map(|(_, len)| *len) {
        Some(expected) => verify_lengths(expected, &streams),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{AudioSegment, Interval, MidiSequence, WarpPath};
    use crate::test_support::{AlwaysRng, NeverRng};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    const A: i64 = 1;
    const K: i64 = 2;

    fn eval_config() -> PreprocessConfig {
        PreprocessConfig {
            fs: 16000,
            train: false,
            ..Default::default()
        }
    }

    fn utterance(nsamples: usize) -> Utterance {
        Utterance {
            uid: "utt1".to_string(),
            intervals: Some(vec![Interval::new(0.0, 0.5, A), Interval::new(0.5, 1.0, K)]),
            midi: Some(MidiSequence {
                pitch: (0..nsamples as i64).map(|i| 60 + i / 8000).collect(),
                tempo: vec![120; nsamples],
            }),
            singing: Some(AudioSegment::new(
                (0..nsamples).map(|i| 0.5 * (i as f32 * 0.05).sin()).collect(),
                16000,
            )),
            text: Some(vec![A, K]),
        }
    }

    fn preprocessor() -> Preprocessor {
        Preprocessor::new(eval_config(), VowelSet::from_ids([A])).unwrap()
    }

    /// Pads or truncates to the path length, recording nothing else.
    struct LengthOnly;

    impl TimeStretcher for LengthOnly {
        fn stretch(&self, samples: &[f32], path: &WarpPath) -> Result<Vec<f32>> {
            let mut out = samples.to_vec();
            out.resize(path.output_len(), 0.0);
            Ok(out)
        }
        fn name(&self) -> &'static str {
            "length-only"
        }
    }

    /// Drops one sample, as a faulty stretcher would.
    struct ShortBy1;

    impl TimeStretcher for ShortBy1 {
        fn stretch(&self, samples: &[f32], path: &WarpPath) -> Result<Vec<f32>> {
            let mut out = samples.to_vec();
            out.resize(path.output_len() - 1, 0.0);
            Ok(out)
        }
        fn name(&self) -> &'static str {
            "short"
        }
    }

    #[test]
    fn forced_anchor_stretches_every_stream() {
        let prep = preprocessor().with_stretcher(Box::new(LengthOnly));
        let out = prep.process(utterance(16000), 1.5, &mut AlwaysRng).unwrap();
        assert_eq!(out.anchors, vec![AnchorPair { start: 0, end: 8001, phoneme_id: A }]);
        let label = out.label.unwrap();
        assert_eq!(label.len(), 20000);
        assert_eq!(out.pitch.as_ref().map(Vec::len), Some(20000));
        assert_eq!(out.tempo.as_ref().map(Vec::len), Some(20000));
        assert_eq!(out.singing.as_ref().map(|s| s.len()), Some(20000));
        assert!(label[..8000].iter().all(|&l| l == A));
        // the shared boundary sample belongs to the next phoneme and stays
        // ahead of the spliced-in run
        assert_eq!(label[8000], K);
        assert!(label[8001..12001].iter().all(|&l| l == A));
        assert_eq!(label[12001], K);
        assert_eq!(label[19999], 0);
        // fill pitch is read at the anchor end, inside the second note
        assert_eq!(out.pitch.unwrap()[8001], 61);
        assert_eq!(out.text, Some(vec![A, K]));
    }

    #[test]
    fn contiguous_vowel_anchors_stay_in_sync() {
        const I: i64 = 3;
        let prep = Preprocessor::new(eval_config(), VowelSet::from_ids([A, I])).unwrap();
        let mut input = utterance(24000);
        input.intervals = Some(vec![
            Interval::new(0.0, 0.5, K),
            Interval::new(0.5, 1.0, A),
            Interval::new(1.0, 1.5, I),
        ]);
        let out = prep.process(input, 1.5, &mut AlwaysRng).unwrap();
        assert_eq!(
            out.anchors,
            vec![
                AnchorPair { start: 8000, end: 16001, phoneme_id: A },
                AnchorPair { start: 16000, end: 23999, phoneme_id: I },
            ]
        );
        // 4000 for the first vowel, 3999 for the second
        let n = 24000 + 7999;
        assert_eq!(out.label.as_ref().map(Vec::len), Some(n));
        assert_eq!(out.pitch.as_ref().map(Vec::len), Some(n));
        assert_eq!(out.tempo.as_ref().map(Vec::len), Some(n));
        assert_eq!(out.singing.as_ref().map(|s| s.len()), Some(n));
    }

    #[test]
    fn unit_factor_is_identity() {
        let prep = preprocessor();
        let input = utterance(16000);
        let aligned = align(input.intervals.as_ref().unwrap(), 16000, 16000).unwrap();
        let pitch = input.midi.as_ref().unwrap().pitch.clone();
        let audio = input.singing.as_ref().unwrap().samples.clone();
        let out = prep.process(input, 1.0, &mut AlwaysRng).unwrap();
        assert!(out.anchors.is_empty());
        assert_eq!(out.label.unwrap(), aligned.label);
        assert_eq!(out.pitch.unwrap(), pitch);
        assert_eq!(out.singing.unwrap().samples, audio);
    }

    #[test]
    fn no_landed_flips_leaves_lengths_untouched() {
        let prep = preprocessor();
        let out = prep.process(utterance(16000), 2.0, &mut NeverRng).unwrap();
        assert!(out.anchors.is_empty());
        assert_eq!(out.label.map(|l| l.len()), Some(16000));
        assert_eq!(out.singing.map(|s| s.len()), Some(16000));
    }

    #[test]
    fn wsola_output_matches_symbolic_streams() {
        let prep = preprocessor();
        for seed in 0..4 {
            let out = prep
                .process(utterance(16000), 1.3, &mut StdRng::seed_from_u64(seed))
                .unwrap();
            let n = out.label.as_ref().map(Vec::len).unwrap();
            assert_eq!(out.pitch.as_ref().map(Vec::len), Some(n));
            assert_eq!(out.tempo.as_ref().map(Vec::len), Some(n));
            assert_eq!(out.singing.as_ref().map(|s| s.len()), Some(n));
        }
    }

    #[test]
    fn faulty_stretcher_is_caught() {
        let prep = preprocessor().with_stretcher(Box::new(ShortBy1));
        assert!(matches!(
            prep.process(utterance(16000), 1.5, &mut AlwaysRng),
            Err(PrepError::DataInconsistency { .. })
        ));
    }

    #[test]
    fn audio_and_midi_must_agree_before_stretching() {
        let prep = preprocessor();
        let mut input = utterance(16000);
        input.singing = Some(AudioSegment::new(vec![0.1; 15000], 16000));
        assert!(matches!(
            prep.process(input, 1.5, &mut AlwaysRng),
            Err(PrepError::DataInconsistency { .. })
        ));
    }

    #[test]
    fn factor_below_one_is_rejected() {
        let prep = preprocessor();
        for factor in [0.5, f64::NAN] {
            assert!(matches!(
                prep.process(utterance(100), factor, &mut AlwaysRng),
                Err(PrepError::InvalidArgument { .. })
            ));
        }
    }

    #[test]
    fn volume_normalization_sets_peak() {
        let mut config = eval_config();
        config.augmentation.singing_volume_normalize = Some(0.9);
        let prep = Preprocessor::new(config, VowelSet::default()).unwrap();
        let input = Utterance {
            uid: "loud".to_string(),
            singing: Some(AudioSegment::new(vec![0.5, -2.0, 1.0, 0.25], 16000)),
            ..Default::default()
        };
        let out = prep.process(input, 1.0, &mut AlwaysRng).unwrap();
        assert_eq!(out.singing.unwrap().peak(), 0.9);
    }

    #[test]
    fn mismatched_midi_pair_is_rejected() {
        let prep = preprocessor();
        let mut input = utterance(16000);
        input.midi = Some(MidiSequence {
            pitch: vec![60; 16000],
            tempo: vec![120; 15999],
        });
        assert!(matches!(
            prep.process(input, 1.0, &mut AlwaysRng),
            Err(PrepError::DataInconsistency { .. })
        ));
    }
}
