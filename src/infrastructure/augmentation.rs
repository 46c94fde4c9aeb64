use crate::config::{AugmentationConfig, NoiseDbRange, VadConfig};
use crate::domain::entities::AudioSegment;
use crate::domain::errors::Result;
use crate::infrastructure::corpus::{read_noise, read_scp, read_wav_mono};
use crate::preprocessing::framing::{detect_non_silence, masked_power};
use num_complex::Complex;
use rand::seq::IndexedRandom;
use rand::{Rng, RngCore};
use rustfft::FftPlanner;
use std::path::PathBuf;
use tracing::{debug, info, warn};

const POWER_FLOOR: f64 = 1e-10;

pub trait Augmentation {
    fn apply(&self, segment: &AudioSegment, rng: &mut dyn RngCore) -> Result<AudioSegment>;
    fn name(&self) -> &'static str;
}

/// Mean power of the non-silent part of `samples`.
pub fn active_power(samples: &[f32], vad: &VadConfig) -> Result<f64> {
    let mask = detect_non_silence(
        samples,
        vad.threshold,
        vad.frame_length,
        vad.frame_shift,
        vad.window,
    )?;
    Ok(masked_power(samples, &mask))
}

/// Linear convolution truncated to the length of `signal`.
pub fn convolve_truncated(signal: &[f32], kernel: &[f32]) -> Vec<f32> {
    if signal.is_empty() || kernel.is_empty() {
        return vec![0.0; signal.len()];
    }
    let n_fft = (signal.len() + kernel.len() - 1).next_power_of_two();
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n_fft);
    let ifft = planner.plan_fft_inverse(n_fft);

    let spectrum = |x: &[f32]| {
        let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];
        buffer
            .iter_mut()
            .zip(x)
            .for_each(|(b, &s)| *b = Complex::new(s, 0.0));
        fft.process(&mut buffer);
        buffer
    };
    let mut product = spectrum(signal);
    let kernel_spectrum = spectrum(kernel);
    product
        .iter_mut()
        .zip(&kernel_spectrum)
        .for_each(|(a, b)| *a *= *b);
    ifft.process(&mut product);
    product
        .iter()
        .take(signal.len())
        .map(|c| c.re / n_fft as f32)
        .collect()
}

/// Reverberation by a randomly chosen impulse response.
pub struct ImpulseResponse {
    rirs: Vec<PathBuf>,
    apply_prob: f64,
    vad: VadConfig,
}

impl ImpulseResponse {
    pub fn new(rirs: Vec<PathBuf>, apply_prob: f64, vad: VadConfig) -> Self {
        ImpulseResponse { rirs, apply_prob, vad }
    }
}

impl Augmentation for ImpulseResponse {
    fn apply(&self, segment: &AudioSegment, rng: &mut dyn RngCore) -> Result<AudioSegment> {
        if self.apply_prob < rng.random::<f64>() {
            return Ok(segment.clone());
        }
        let Some(rir_path) = self.rirs.choose(&mut *rng) else {
            return Ok(segment.clone());
        };
        let (rir, rir_rate) = read_wav_mono(rir_path)?;
        if rir_rate != segment.sample_rate {
            warn!(
                rir = %rir_path.display(),
                rir_rate,
                sample_rate = segment.sample_rate,
                "impulse response sample rate differs from singing"
            );
        }
        let power = active_power(&segment.samples, &self.vad)?;
        let reverbed = convolve_truncated(&segment.samples, &rir);
        let power2 = active_power(&reverbed, &self.vad)?;
        let gain = (power / power2.max(POWER_FLOOR)).sqrt() as f32;
        debug!(rir = %rir_path.display(), gain, "convolved impulse response");
        Ok(AudioSegment::new(
            reverbed.into_iter().map(|s| s * gain).collect(),
            segment.sample_rate,
        ))
    }

    fn name(&self) -> &'static str {
        "rir"
    }
}

/// Additive noise at an SNR drawn uniformly from a dB range.
pub struct AdditiveNoise {
    noises: Vec<PathBuf>,
    apply_prob: f64,
    db_range: NoiseDbRange,
    vad: VadConfig,
}

impl AdditiveNoise {
    pub fn new(noises: Vec<PathBuf>, apply_prob: f64, db_range: NoiseDbRange, vad: VadConfig) -> Self {
        AdditiveNoise {
            noises,
            apply_prob,
            db_range,
            vad,
        }
    }

    pub fn scale(snr_db: f64, power: f64, noise_power: f64) -> f64 {
        10f64.powf(-snr_db / 20.0) * power.sqrt() / noise_power.max(POWER_FLOOR).sqrt()
    }
}

impl Augmentation for AdditiveNoise {
    fn apply(&self, segment: &AudioSegment, rng: &mut dyn RngCore) -> Result<AudioSegment> {
        if self.apply_prob < rng.random::<f64>() {
            return Ok(segment.clone());
        }
        let Some(noise_path) = self.noises.choose(&mut *rng) else {
            return Ok(segment.clone());
        };
        let snr_db = if self.db_range.low < self.db_range.high {
            rng.random_range(self.db_range.low..self.db_range.high)
        } else {
            self.db_range.low
        };
        let noise = read_noise(noise_path, segment.len(), &mut *rng)?;
        let power = active_power(&segment.samples, &self.vad)?;
        let noise_power = if noise.is_empty() {
            0.0
        } else {
            noise.iter().map(|&n| (n as f64) * (n as f64)).sum::<f64>() / noise.len() as f64
        };
        let scale = Self::scale(snr_db, power, noise_power) as f32;
        debug!(noise = %noise_path.display(), snr_db, scale, "mixed noise");
        Ok(AudioSegment::new(
            segment
                .samples
                .iter()
                .zip(&noise)
                .map(|(&s, &n)| s + scale * n)
                .collect(),
            segment.sample_rate,
        ))
    }

    fn name(&self) -> &'static str {
        "noise"
    }
}

/// Scales down only when the signal clips.
pub fn limit_peak(segment: &mut AudioSegment) {
    let peak = segment.peak();
    if peak > 1.0 {
        segment.samples.iter_mut().for_each(|s| *s /= peak);
    }
}

/// Scales the signal so that its peak is exactly `target`.
pub fn normalize_volume(segment: &mut AudioSegment, target: f32) {
    let peak = segment.peak();
    if peak > 0.0 {
        segment.samples.iter_mut().for_each(|s| *s = *s * target / peak);
    }
}

/// Impulse-response and noise perturbation applied in sequence.
pub struct Perturbation {
    augmentations: Vec<Box<dyn Augmentation>>,
}

impl Perturbation {
    pub fn new(augmentations: Vec<Box<dyn Augmentation>>) -> Self {
        Perturbation { augmentations }
    }

    pub fn from_config(config: &AugmentationConfig, vad: VadConfig) -> Result<Self> {
        let mut augmentations: Vec<Box<dyn Augmentation>> = Vec::new();
        if let Some(scp) = &config.rir_scp {
            let rirs = read_scp(scp)?;
            info!(count = rirs.len(), scp = %scp.display(), "loaded impulse responses");
            augmentations.push(Box::new(ImpulseResponse::new(rirs, config.rir_apply_prob, vad)));
        }
        if let Some(scp) = &config.noise_scp {
            let noises = read_scp(scp)?;
            let db_range = NoiseDbRange::parse(&config.noise_db_range)?;
            info!(count = noises.len(), scp = %scp.display(), "loaded noise clips");
            augmentations.push(Box::new(AdditiveNoise::new(
                noises,
                config.noise_apply_prob,
                db_range,
                vad,
            )));
        }
        Ok(Perturbation { augmentations })
    }

    pub fn is_empty(&self) -> bool {
        self.augmentations.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.augmentations.iter().map(|a| a.name()).collect()
    }

    pub fn apply(&self, segment: &AudioSegment, rng: &mut dyn RngCore) -> Result<AudioSegment> {
        let mut current = segment.clone();
        for aug in &self.augmentations {
            current = aug.apply(&current, rng)?;
        }
        limit_peak(&mut current);
        Ok(current)
    }
}
