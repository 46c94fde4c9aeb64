//! Fixed-length framing and power based voice activity detection.

use crate::domain::errors::{PrepError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::str::FromStr;

/// Analysis window applied to each frame before measuring power.
///
/// Windows are periodic (DFT-even), matching the convention used by
/// spectral analysis packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    #[default]
    Boxcar,
    Hann,
    Hamming,
}

impl Window {
    pub fn coefficients(&self, length: usize) -> Vec<f64> {
        let n = length as f64;
        (0..length)
            .map(|i| {
                let phase = 2.0 * PI * i as f64 / n;
                match self {
                    Window::Boxcar => 1.0,
                    Window::Hann => 0.5 - 0.5 * phase.cos(),
                    Window::Hamming => 0.54 - 0.46 * phase.cos(),
                }
            })
            .collect()
    }
}

impl FromStr for Window {
    type Err = PrepError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "boxcar" => Ok(Window::Boxcar),
            "hann" => Ok(Window::Hann),
            "hamming" => Ok(Window::Hamming),
            other => Err(PrepError::invalid_argument(format!(
                "unsupported window '{other}'"
            ))),
        }
    }
}

/// Overlapping windows over a signal.
///
/// Frame `i` covers `buffer[i * frame_shift..i * frame_shift + frame_length]`
/// of the (possibly padded) buffer; frames are borrowed, never copied.
#[derive(Debug, Clone)]
pub struct Frames {
    buffer: Vec<f32>,
    frame_length: usize,
    frame_shift: usize,
    n_frames: usize,
}

impl Frames {
    pub fn frame_length(&self) -> usize {
        self.frame_length
    }

    pub fn frame_shift(&self) -> usize {
        self.frame_shift
    }

    pub fn len(&self) -> usize {
        self.n_frames
    }

    pub fn is_empty(&self) -> bool {
        self.n_frames == 0
    }

    pub fn frame(&self, i: usize) -> &[f32] {
        let start = i * self.frame_shift;
        &self.buffer[start..start + self.frame_length]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.n_frames).map(move |i| self.frame(i))
    }

    pub fn to_vec(&self) -> Vec<Vec<f32>> {
        self.iter().map(|f| f.to_vec()).collect()
    }

    /// Places every frame back at `i * frame_shift`, yielding the covered
    /// part of the framed buffer.
    pub fn reassemble(&self) -> Vec<f32> {
        if self.n_frames == 0 {
            return Vec::new();
        }
        let covered = self.frame_length + (self.n_frames - 1) * self.frame_shift;
        let mut out = vec![0.0f32; covered];
        for (i, frame) in self.iter().enumerate() {
            let start = i * self.frame_shift;
            out[start..start + self.frame_length].copy_from_slice(frame);
        }
        out
    }
}

pub fn frame(
    x: &[f32],
    frame_length: usize,
    frame_shift: usize,
    centered: bool,
    padded: bool,
) -> Result<Frames> {
    if x.is_empty() {
        return Err(PrepError::invalid_argument("input array size is zero"));
    }
    if frame_length < 1 {
        return Err(PrepError::invalid_argument(
            "frame_length must be a positive integer",
        ));
    }
    if frame_length > x.len() {
        return Err(PrepError::invalid_argument(
            "frame_length is greater than input length",
        ));
    }
    if frame_shift == 0 {
        return Err(PrepError::invalid_argument("frame_shift must be greater than 0"));
    }

    let mut buffer = Vec::with_capacity(x.len() + frame_length);
    if centered {
        let half = frame_length / 2;
        buffer.extend(std::iter::repeat_n(0.0f32, half));
        buffer.extend_from_slice(x);
        buffer.extend(std::iter::repeat_n(0.0f32, half));
    } else {
        buffer.extend_from_slice(x);
    }

    if padded {
        // Make the buffer length frame_length + (n - 1) * frame_shift.
        let rem = (buffer.len() - frame_length) % frame_shift;
        let nadd = ((frame_shift - rem) % frame_shift) % frame_length;
        buffer.extend(std::iter::repeat_n(0.0f32, nadd));
    }

    let n_frames = (buffer.len() - frame_length) / frame_shift + 1;
    Ok(Frames {
        buffer,
        frame_length,
        frame_shift,
        n_frames,
    })
}

pub fn frame_channels(
    channels: &[Vec<f32>],
    frame_length: usize,
    frame_shift: usize,
    centered: bool,
    padded: bool,
) -> Result<Vec<Frames>> {
    channels
        .iter()
        .map(|c| frame(c, frame_length, frame_shift, centered, padded))
        .collect()
}

fn frame_powers(x: &[f32], frame_length: usize, frame_shift: usize, window: &[f64]) -> Result<Vec<f64>> {
    let frames = frame(x, frame_length, frame_shift, false, true)?;
    Ok(frames
        .iter()
        .map(|f| {
            f.iter()
                .zip(window)
                .map(|(&s, &w)| {
                    let v = s as f64 * w;
                    v * v
                })
                .sum::<f64>()
                / frame_length as f64
        })
        .collect())
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn broadcast_decisions(power: &[f64], mean_power: f64, threshold: f64, frame_shift: usize, n: usize) -> Vec<bool> {
    let mut mask: Vec<bool> = power
        .iter()
        .flat_map(|&p| std::iter::repeat_n(p / mean_power > threshold, frame_shift))
        .take(n)
        .collect();
    let last = mask.last().copied().unwrap_or(true);
    mask.resize(n, last);
    mask
}

fn check_vad_args(frame_length: usize, frame_shift: usize) -> Result<()> {
    if frame_length < 1 {
        return Err(PrepError::invalid_argument(
            "frame_length must be a positive integer",
        ));
    }
    if frame_shift == 0 {
        return Err(PrepError::invalid_argument("frame_shift must be greater than 0"));
    }
    Ok(())
}

/// Flags samples whose frame power exceeds `threshold` times the mean frame
/// power. The mask always has the length of `x`.
pub fn detect_non_silence(
    x: &[f32],
    threshold: f64,
    frame_length: usize,
    frame_shift: usize,
    window: Window,
) -> Result<Vec<bool>> {
    check_vad_args(frame_length, frame_shift)?;
    if x.len() < frame_length {
        return Ok(vec![true; x.len()]);
    }
    let coeffs = window.coefficients(frame_length);
    let power = frame_powers(x, frame_length, frame_shift, &coeffs)?;
    let mean_power = mean(&power);
    if mean_power == 0.0 {
        return Ok(vec![true; x.len()]);
    }
    Ok(broadcast_decisions(&power, mean_power, threshold, frame_shift, x.len()))
}

/// Per-channel variant; silence is degenerate only when every channel is silent.
pub fn detect_non_silence_channels(
    channels: &[Vec<f32>],
    threshold: f64,
    frame_length: usize,
    frame_shift: usize,
    window: Window,
) -> Result<Vec<Vec<bool>>> {
    check_vad_args(frame_length, frame_shift)?;
    let all_true = || channels.iter().map(|c| vec![true; c.len()]).collect();
    if channels.iter().any(|c| c.len() < frame_length) {
        return Ok(all_true());
    }
    let coeffs = window.coefficients(frame_length);
    let powers = channels
        .iter()
        .map(|c| frame_powers(c, frame_length, frame_shift, &coeffs))
        .collect::<Result<Vec<_>>>()?;
    let means: Vec<f64> = powers.iter().map(|p| mean(p)).collect();
    if means.iter().all(|&m| m == 0.0) {
        return Ok(all_true());
    }
    Ok(channels
        .iter()
        .zip(powers.iter().zip(&means))
        .map(|(c, (p, &m))| broadcast_decisions(p, m, threshold, frame_shift, c.len()))
        .collect())
}

/// Mean power over the samples selected by `mask`.
pub fn masked_power(x: &[f32], mask: &[bool]) -> f64 {
    let (sum, count) = x
        .iter()
        .zip(mask)
        .filter(|(_, m)| **m)
        .fold((0.0f64, 0usize), |(sum, count), (&s, _)| {
            (sum + (s as f64) * (s as f64), count + 1)
        });
    if count == 0 { 0.0 } else { sum / count as f64 }
}
