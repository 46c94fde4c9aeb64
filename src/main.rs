use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use svs_prep::infrastructure::corpus::{read_wav_mono, write_wav};
use svs_prep::{AnchorPair, AudioSegment, Interval, MidiSequence, PreprocessConfig, Preprocessor, Utterance};

#[derive(Parser, Debug)]
#[command(
    name = "svs-prep",
    about = "Align phoneme labels to singing audio and apply time-synchronized augmentation"
)]
struct Args {
    /// TOML preprocessing config.
    #[arg(long, short = 'c')]
    config: PathBuf,

    /// JSON manifest listing the utterances to process.
    #[arg(long, short = 'm')]
    manifest: PathBuf,

    /// Directory receiving `<uid>.wav` and `<uid>.json` per utterance.
    #[arg(long, short = 'o')]
    output_dir: PathBuf,

    /// Stretch factor for selected vowels (>= 1; 1 disables stretching).
    #[arg(long, short = 'f', default_value_t = 1.0)]
    factor: f64,

    /// Random seed, overriding the config.
    #[arg(long, short = 's')]
    seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    uid: String,
    wav: PathBuf,
    #[serde(default)]
    intervals: Option<Vec<Interval>>,
    #[serde(default)]
    pitch: Option<Vec<i64>>,
    #[serde(default)]
    tempo: Option<Vec<i64>>,
    #[serde(default)]
    text: Option<Vec<i64>>,
}

#[derive(Debug, Serialize)]
struct OutputRecord<'a> {
    uid: &'a str,
    text: Option<&'a [i64]>,
    label: Option<&'a [i64]>,
    pitch: Option<&'a [i64]>,
    tempo: Option<&'a [i64]>,
    anchors: &'a [AnchorPair],
}

fn load_utterance(entry: ManifestEntry) -> anyhow::Result<Utterance> {
    let (samples, sample_rate) =
        read_wav_mono(&entry.wav).with_context(|| format!("loading {}", entry.wav.display()))?;
    let midi = match (entry.pitch, entry.tempo) {
        (Some(pitch), Some(tempo)) => Some(MidiSequence { pitch, tempo }),
        (None, None) => None,
        _ => anyhow::bail!("{}: pitch and tempo must be given together", entry.uid),
    };
    Ok(Utterance {
        uid: entry.uid,
        intervals: entry.intervals,
        midi,
        singing: Some(AudioSegment::new(samples, sample_rate)),
        text: entry.text,
    })
}

fn process_entry(
    preprocessor: &Preprocessor,
    entry: ManifestEntry,
    factor: f64,
    rng: &mut StdRng,
    output_dir: &Path,
) -> anyhow::Result<()> {
    let utterance = load_utterance(entry)?;
    let out = preprocessor.process(utterance, factor, rng)?;

    if let Some(singing) = &out.singing {
        let wav_path = output_dir.join(format!("{}.wav", out.uid));
        write_wav(&wav_path, &singing.samples, singing.sample_rate, 1)?;
    }
    let record = OutputRecord {
        uid: &out.uid,
        text: out.text.as_deref(),
        label: out.label.as_deref(),
        pitch: out.pitch.as_deref(),
        tempo: out.tempo.as_deref(),
        anchors: &out.anchors,
    };
    let json_path = output_dir.join(format!("{}.json", out.uid));
    fs::write(&json_path, serde_json::to_string(&record)?)
        .with_context(|| format!("writing {}", json_path.display()))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = PreprocessConfig::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    let seed = args.seed.or(config.seed);
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let preprocessor = Preprocessor::from_config(config)?;

    let manifest_str = fs::read_to_string(&args.manifest)
        .with_context(|| format!("reading manifest {}", args.manifest.display()))?;
    let entries: Vec<ManifestEntry> = serde_json::from_str(&manifest_str)
        .with_context(|| format!("parsing manifest {}", args.manifest.display()))?;
    fs::create_dir_all(&args.output_dir)?;

    tracing::info!(
        utterances = entries.len(),
        factor = args.factor,
        seed = ?seed,
        "starting preprocessing"
    );
    let pb = ProgressBar::new(entries.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );
    pb.set_message("Preprocessing utterances");

    let mut failed = 0usize;
    for entry in entries {
        let uid = entry.uid.clone();
        if let Err(err) = process_entry(&preprocessor, entry, args.factor, &mut rng, &args.output_dir) {
            tracing::error!(uid = %uid, "skipping utterance: {err:#}");
            failed += 1;
        }
        pb.inc(1);
    }
    pb.finish_with_message("Preprocessing completed!");

    if failed > 0 {
        tracing::warn!(failed, "some utterances were skipped");
    }
    Ok(())
}
