use crate::domain::entities::WarpPath;
use crate::domain::errors::{PrepError, Result};
use num_complex::Complex;
use rustfft::FftPlanner;

/// Resamples a waveform so that it follows a warp path.
///
/// The returned signal has exactly `path.output_len()` samples.
pub trait TimeStretcher {
    fn stretch(&self, samples: &[f32], path: &WarpPath) -> Result<Vec<f32>>;
    fn name(&self) -> &'static str;
}

/// Waveform-similarity overlap-add driven by anchor points.
///
/// Synthesis frames are laid out every `syn_hop` samples; each analysis
/// frame is read at the source position the path maps it to, shifted by
/// up to `tolerance` samples to best continue the previous frame.
#[derive(Debug, Clone, Copy)]
pub struct Wsola {
    pub win_size: usize,
    pub syn_hop: usize,
    pub tolerance: usize,
}

impl Default for Wsola {
    fn default() -> Self {
        Wsola {
            win_size: 1024,
            syn_hop: 512,
            tolerance: 512,
        }
    }
}

fn check_path(path: &WarpPath, nsamples: usize) -> Result<()> {
    if path.source.len() != path.target.len() || path.is_empty() {
        return Err(PrepError::invalid_argument(
            "warp path needs matching, non-empty source and target points",
        ));
    }
    if !path.is_monotonic() {
        return Err(PrepError::invalid_argument("warp path must be non-decreasing"));
    }
    if let Some(&last) = path.source.last() {
        if last > nsamples {
            return Err(PrepError::invalid_argument(format!(
                "warp path reaches sample {last} of a {nsamples}-sample signal"
            )));
        }
    }
    Ok(())
}

/// Maps a stretched position back to the source, clamping outside the path.
fn source_position(path: &WarpPath, t: f64) -> f64 {
    let first = path.target[0] as f64;
    if t <= first {
        return path.source[0] as f64;
    }
    for k in 0..path.len() - 1 {
        let (t0, t1) = (path.target[k] as f64, path.target[k + 1] as f64);
        if t <= t1 && t1 > t0 {
            let (s0, s1) = (path.source[k] as f64, path.source[k + 1] as f64);
            return s0 + (t - t0) * (s1 - s0) / (t1 - t0);
        }
    }
    path.source[path.len() - 1] as f64
}

fn hann(length: usize) -> Vec<f32> {
    (0..length)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / length as f32;
            0.5 - 0.5 * phase.cos()
        })
        .collect()
}

struct Correlator {
    n_fft: usize,
    fft: std::sync::Arc<dyn rustfft::Fft<f32>>,
    ifft: std::sync::Arc<dyn rustfft::Fft<f32>>,
}

impl Correlator {
    fn new(len: usize) -> Self {
        let n_fft = len.next_power_of_two();
        let mut planner = FftPlanner::new();
        Correlator {
            n_fft,
            fft: planner.plan_fft_forward(n_fft),
            ifft: planner.plan_fft_inverse(n_fft),
        }
    }

    /// Lag in `0..=max_lag` maximising `sum_j template[j] * region[lag + j]`.
    fn best_lag(&self, template: &[f32], region: &[f32], max_lag: usize) -> usize {
        let mut a = vec![Complex::new(0.0f32, 0.0); self.n_fft];
        let mut b = vec![Complex::new(0.0f32, 0.0); self.n_fft];
        for (dst, &s) in a.iter_mut().zip(region) {
            *dst = Complex::new(s, 0.0);
        }
        for (dst, &s) in b.iter_mut().zip(template) {
            *dst = Complex::new(s, 0.0);
        }
        self.fft.process(&mut a);
        self.fft.process(&mut b);
        for (x, y) in a.iter_mut().zip(&b) {
            *x *= y.conj();
        }
        self.ifft.process(&mut a);
        // ties, e.g. silent regions, keep the unshifted lag
        let center = max_lag / 2;
        a.iter()
            .take(max_lag + 1)
            .enumerate()
            .fold((center, a[center].re), |(best, best_val), (k, c)| {
                if c.re > best_val { (k, c.re) } else { (best, best_val) }
            })
            .0
    }
}

impl TimeStretcher for Wsola {
    fn stretch(&self, samples: &[f32], path: &WarpPath) -> Result<Vec<f32>> {
        check_path(path, samples.len())?;
        if self.win_size < 2 || self.syn_hop == 0 || self.syn_hop > self.win_size {
            return Err(PrepError::invalid_argument(
                "wsola needs win_size >= 2 and 0 < syn_hop <= win_size",
            ));
        }
        let out_len = path.output_len();
        if path.source == path.target {
            let mut out = samples.to_vec();
            out.resize(out_len, 0.0);
            return Ok(out);
        }

        let win = self.win_size;
        let half = win / 2;
        let tol = self.tolerance;
        let window = hann(win);

        let syn_pos: Vec<usize> = (0..=out_len + half).step_by(self.syn_hop).collect();
        let ana_pos: Vec<usize> = syn_pos
            .iter()
            .map(|&p| source_position(path, p as f64).round().max(0.0) as usize)
            .map(|p| p.min(samples.len()))
            .collect();

        let pad = half + tol;
        let mut padded = vec![0.0f32; pad + samples.len() + pad + 2 * win];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let mut out = vec![0.0f32; syn_pos.last().copied().unwrap_or(0) + win];
        let mut norm = vec![0.0f32; out.len()];
        let correlator = Correlator::new(win + win + 2 * tol);
        let mut delta: isize = 0;

        for i in 0..syn_pos.len() {
            let start = (ana_pos[i] + tol) as isize + delta;
            let start = start.max(0) as usize;
            let frame = &padded[start..start + win];
            let dst = syn_pos[i];
            for j in 0..win {
                out[dst + j] += frame[j] * window[j];
                norm[dst + j] += window[j];
            }

            if i + 1 < syn_pos.len() {
                let natural_start = start + self.syn_hop;
                let natural = &padded[natural_start..natural_start + win];
                let region_start = ana_pos[i + 1];
                let region = &padded[region_start..region_start + win + 2 * tol];
                let lag = correlator.best_lag(natural, region, 2 * tol);
                delta = lag as isize - tol as isize;
            }
        }

        Ok((0..out_len)
            .map(|j| {
                let w = norm[j + half];
                if w > 1e-3 { out[j + half] / w } else { out[j + half] }
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "wsola"
    }
}
