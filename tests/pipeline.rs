use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use svs_prep::infrastructure::corpus::write_wav;
use svs_prep::preprocessing::synchronizer::{build_warp_path, plan_inserts};
use svs_prep::{
    AudioSegment, Interval, MidiSequence, PrepError, PreprocessConfig, Preprocessor, Utterance,
    VowelSet,
};

/// Every draw is zero: every coin flip lands and every choice picks the first item.
/// The crate's own test rngs are `cfg(test)` only, so this one lives here.
struct ForcedRng;

impl rand::RngCore for ForcedRng {
    fn next_u32(&mut self) -> u32 {
        0
    }
    fn next_u64(&mut self) -> u64 {
        0
    }
    fn fill_bytes(&mut self, dst: &mut [u8]) {
        dst.fill(0);
    }
}

const TOKENS: &str = "<blank>\na\ne\ni\no\nu\nk\n<unk>\n";

fn vowels(dir: &std::path::Path) -> VowelSet {
    let path = dir.join("tokens.txt");
    fs::write(&path, TOKENS).unwrap();
    VowelSet::from_token_list(&path, &["a", "e", "i", "o", "u"]).unwrap()
}

fn scenario(nsamples: usize) -> Utterance {
    Utterance {
        uid: "scenario".to_string(),
        // 'a' = 1, 'k' = 6 in the token list above
        intervals: Some(vec![Interval::new(0.0, 0.5, 1), Interval::new(0.5, 1.0, 6)]),
        midi: Some(MidiSequence {
            pitch: vec![62; nsamples],
            tempo: vec![90; nsamples],
        }),
        singing: Some(AudioSegment::new(
            (0..nsamples)
                .map(|i| 0.3 * (i as f32 * 0.031).sin())
                .collect(),
            16000,
        )),
        text: None,
    }
}

fn eval_config() -> PreprocessConfig {
    PreprocessConfig {
        fs: 16000,
        train: false,
        ..Default::default()
    }
}

#[test]
fn forced_vowel_anchor_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let prep = Preprocessor::new(eval_config(), vowels(dir.path())).unwrap();
    let out = prep.process(scenario(16000), 1.5, &mut ForcedRng).unwrap();

    assert_eq!(out.anchors.len(), 1);
    let anchor = out.anchors[0];
    assert_eq!((anchor.start, anchor.end, anchor.phoneme_id), (0, 8001, 1));

    let label = out.label.unwrap();
    assert_eq!(label.len(), 20000);
    assert_eq!(label.iter().filter(|&&l| l == 1).count(), 8000 + 4000);
    assert_eq!(out.pitch.map(|p| p.len()), Some(20000));
    assert_eq!(out.tempo.map(|t| t.len()), Some(20000));
    assert_eq!(out.singing.map(|s| s.len()), Some(20000));
}

#[test]
fn unit_factor_leaves_streams_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let prep = Preprocessor::new(eval_config(), vowels(dir.path())).unwrap();
    let input = scenario(16000);
    let audio = input.singing.clone().unwrap().samples;
    let out = prep.process(input, 1.0, &mut ForcedRng).unwrap();
    assert!(out.anchors.is_empty());
    assert_eq!(out.label.map(|l| l.len()), Some(16000));
    assert_eq!(out.pitch, Some(vec![62; 16000]));
    assert_eq!(out.singing.unwrap().samples, audio);
}

#[test]
fn lengths_agree_with_training_perturbation() {
    let dir = tempfile::tempdir().unwrap();
    let rir_path = dir.path().join("rir.wav");
    let noise_path = dir.path().join("noise.wav");
    write_wav(&rir_path, &[1.0, 0.0, 0.3, 0.1], 16000, 1).unwrap();
    let noise: Vec<f32> = (0..3000).map(|i| ((i * 7919) % 200) as f32 / 100.0 - 1.0).collect();
    write_wav(&noise_path, &noise, 16000, 1).unwrap();
    fs::write(dir.path().join("rir.scp"), format!("r1 {}\n", rir_path.display())).unwrap();
    fs::write(dir.path().join("noise.scp"), format!("{}\n", noise_path.display())).unwrap();

    let mut config = eval_config();
    config.train = true;
    config.augmentation.rir_scp = Some(dir.path().join("rir.scp"));
    config.augmentation.noise_scp = Some(dir.path().join("noise.scp"));
    config.augmentation.noise_db_range = "3_10".to_string();
    let prep = Preprocessor::new(config, vowels(dir.path())).unwrap();

    for seed in 0..3 {
        let mut rng = StdRng::seed_from_u64(seed);
        let out = prep.process(scenario(16000), 1.25, &mut rng).unwrap();
        let n = out.label.as_ref().unwrap().len();
        assert_eq!(out.pitch.as_ref().unwrap().len(), n);
        assert_eq!(out.tempo.as_ref().unwrap().len(), n);
        let singing = out.singing.unwrap();
        assert_eq!(singing.len(), n);
        assert!(singing.peak() <= 1.0);
    }
}

#[test]
fn missing_noise_file_aborts_the_utterance() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("noise.scp"), "n1 /nonexistent/noise.wav\n").unwrap();
    let mut config = eval_config();
    config.train = true;
    config.augmentation.noise_scp = Some(dir.path().join("noise.scp"));
    let prep = Preprocessor::new(config, vowels(dir.path())).unwrap();
    assert!(matches!(
        prep.process(scenario(16000), 1.0, &mut ForcedRng),
        Err(PrepError::Wav { .. })
    ));
}

#[test]
fn peak_normalization_scenario() {
    let mut config = eval_config();
    config.augmentation.singing_volume_normalize = Some(0.9);
    let prep = Preprocessor::new(config, VowelSet::default()).unwrap();
    let input = Utterance {
        uid: "peak".to_string(),
        singing: Some(AudioSegment::new(vec![0.1, 2.0, -1.0, 0.5], 16000)),
        ..Default::default()
    };
    let out = prep.process(input, 1.0, &mut ForcedRng).unwrap();
    let peak = out.singing.unwrap().peak();
    assert_eq!(peak, 0.9);
}

#[test]
fn config_file_drives_preprocessor() {
    let dir = tempfile::tempdir().unwrap();
    let tokens = dir.path().join("tokens.txt");
    fs::write(&tokens, TOKENS).unwrap();
    let config_path = dir.path().join("prep.toml");
    fs::write(
        &config_path,
        format!(
            "fs = 16000\ntrain = false\ntoken_list = \"{}\"\n\n[vad]\nthreshold = 0.02\n",
            tokens.display()
        ),
    )
    .unwrap();
    let config = PreprocessConfig::load(&config_path).unwrap();
    let prep = Preprocessor::from_config(config).unwrap();
    let out = prep.process(scenario(16000), 2.0, &mut ForcedRng).unwrap();
    assert_eq!(out.label.map(|l| l.len()), Some(16000 + 8001));
}

/// Back-to-back intervals that open with a run of vowels, then mix in `k`.
fn random_utterance(rng: &mut StdRng, fs: u32) -> (Utterance, usize) {
    let count = rng.random_range(4..9);
    let mut intervals = Vec::with_capacity(count);
    let mut t = 0.0f64;
    for i in 0..count {
        let duration = rng.random_range(0.1..0.4);
        let phoneme_id = if i < 3 || rng.random::<f64>() < 0.7 {
            rng.random_range(1..6)
        } else {
            6
        };
        intervals.push(Interval::new(t, t + duration, phoneme_id));
        t += duration;
    }
    let nsamples = (t * fs as f64).round() as usize;
    let utterance = Utterance {
        uid: "generated".to_string(),
        intervals: Some(intervals),
        midi: Some(MidiSequence {
            pitch: (0..nsamples).map(|i| 60 + (i / 4000) as i64).collect(),
            tempo: vec![100; nsamples],
        }),
        singing: Some(AudioSegment::new(
            (0..nsamples).map(|i| 0.4 * (i as f32 * 0.02).sin()).collect(),
            fs,
        )),
        text: None,
    };
    (utterance, nsamples)
}

#[test]
fn generated_vowel_runs_keep_streams_in_sync() {
    let dir = tempfile::tempdir().unwrap();
    let prep = Preprocessor::new(eval_config(), vowels(dir.path())).unwrap();

    for seed in 0..8 {
        let mut rng = StdRng::seed_from_u64(seed);
        let (input, nsamples) = random_utterance(&mut rng, 16000);
        let factor = rng.random_range(1.2..2.0);
        let out = prep.process(input, factor, &mut rng).unwrap();

        let plan = plan_inserts(&out.anchors, factor, None, None).unwrap();
        let path = build_warp_path(&out.anchors, &plan, nsamples).unwrap();
        assert!(path.is_monotonic(), "seed {seed}: {:?}", path.source);

        let n = nsamples + plan.total();
        assert_eq!(path.output_len(), n, "seed {seed}");
        assert_eq!(out.label.as_ref().map(Vec::len), Some(n), "seed {seed}");
        assert_eq!(out.pitch.as_ref().map(Vec::len), Some(n), "seed {seed}");
        assert_eq!(out.tempo.as_ref().map(Vec::len), Some(n), "seed {seed}");
        assert_eq!(out.singing.as_ref().map(|s| s.len()), Some(n), "seed {seed}");
    }
}

#[test]
fn every_vowel_forced_in_a_vowel_run() {
    let dir = tempfile::tempdir().unwrap();
    let prep = Preprocessor::new(eval_config(), vowels(dir.path())).unwrap();
    let mut input = scenario(32000);
    // a e i o, half a second each and touching the next
    input.intervals = Some(
        (0..4)
            .map(|i| Interval::new(i as f64 * 0.5, (i + 1) as f64 * 0.5, i as i64 + 1))
            .collect(),
    );
    let out = prep.process(input, 1.5, &mut ForcedRng).unwrap();
    assert_eq!(out.anchors.len(), 4);
    let plan = plan_inserts(&out.anchors, 1.5, None, None).unwrap();
    assert!(build_warp_path(&out.anchors, &plan, 32000).unwrap().is_monotonic());
    let n = 32000 + plan.total();
    assert_eq!(out.label.map(|l| l.len()), Some(n));
    assert_eq!(out.singing.map(|s| s.len()), Some(n));
}
