use crate::domain::errors::{PrepError, Result};
use crate::preprocessing::framing::Window;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_VOWELS: [&str; 5] = ["a", "e", "i", "o", "u"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Sample rate the interval times are converted with.
    pub fs: u32,
    pub train: bool,
    /// Process-wide seed; entropy is used when absent.
    pub seed: Option<u64>,
    pub token_list: Option<PathBuf>,
    pub vowels: Vec<String>,
    pub vad: VadConfig,
    pub augmentation: AugmentationConfig,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        PreprocessConfig {
            fs: 24000,
            train: true,
            seed: None,
            token_list: None,
            vowels: DEFAULT_VOWELS.iter().map(|v| v.to_string()).collect(),
            vad: VadConfig::default(),
            augmentation: AugmentationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    pub threshold: f64,
    pub frame_length: usize,
    pub frame_shift: usize,
    pub window: Window,
}

impl Default for VadConfig {
    fn default() -> Self {
        VadConfig {
            threshold: 0.01,
            frame_length: 1024,
            frame_shift: 512,
            window: Window::Boxcar,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    pub rir_scp: Option<PathBuf>,
    pub rir_apply_prob: f64,
    pub noise_scp: Option<PathBuf>,
    pub noise_apply_prob: f64,
    /// SNR bounds in dB, written `"<low>_<high>"`.
    pub noise_db_range: String,
    pub singing_volume_normalize: Option<f32>,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        AugmentationConfig {
            rir_scp: None,
            rir_apply_prob: 1.0,
            noise_scp: None,
            noise_apply_prob: 1.0,
            noise_db_range: "3_10".to_string(),
            singing_volume_normalize: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseDbRange {
    pub low: f64,
    pub high: f64,
}

impl NoiseDbRange {
    pub fn parse(range: &str) -> Result<Self> {
        let parts: Vec<&str> = range.trim().split('_').collect();
        let value = |s: &str| {
            s.parse::<f64>().map_err(|_| {
                PrepError::invalid_argument(format!(
                    "format error: '{range}', expected e.g. -3_4 -> [-3db,4db]"
                ))
            })
        };
        let (low, high) = match parts.as_slice() {
            [single] => {
                let v = value(single)?;
                (v, v)
            }
            [low, high] => (value(low)?, value(high)?),
            _ => {
                return Err(PrepError::invalid_argument(format!(
                    "format error: '{range}', expected e.g. -3_4 -> [-3db,4db]"
                )));
            }
        };
        if !low.is_finite() || !high.is_finite() || low > high {
            return Err(PrepError::invalid_argument(format!(
                "noise_db_range '{range}' must satisfy low <= high"
            )));
        }
        Ok(NoiseDbRange { low, high })
    }
}

impl PreprocessConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .map_err(|e| PrepError::io(format!("reading config {}", path.display()), e))?;
        let config: PreprocessConfig = toml::from_str(&config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fs == 0 {
            return Err(PrepError::invalid_argument("fs must be greater than 0"));
        }
        self.vad.validate()?;
        let aug = &self.augmentation;
        for (name, p) in [
            ("rir_apply_prob", aug.rir_apply_prob),
            ("noise_apply_prob", aug.noise_apply_prob),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(PrepError::invalid_argument(format!(
                    "{name} must be within [0, 1], got {p}"
                )));
            }
        }
        NoiseDbRange::parse(&aug.noise_db_range)?;
        if let Some(level) = aug.singing_volume_normalize {
            if !(level.is_finite() && level > 0.0) {
                return Err(PrepError::invalid_argument(format!(
                    "singing_volume_normalize must be positive, got {level}"
                )));
            }
        }
        Ok(())
    }
}

impl VadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.frame_length < 1 {
            return Err(PrepError::invalid_argument(
                "frame_length must be a positive integer",
            ));
        }
        if self.frame_shift == 0 {
            return Err(PrepError::invalid_argument("frame_shift must be greater than 0"));
        }
        if !self.threshold.is_finite() {
            return Err(PrepError::invalid_argument("threshold must be finite"));
        }
        Ok(())
    }
}
