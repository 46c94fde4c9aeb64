//! Flat file lists and WAV access for impulse-response and noise corpora.

use crate::domain::errors::{PrepError, Result};
use rand::{Rng, RngCore};
use std::fs;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

/// Reads a list where each line is either `path` or `key path`.
pub fn read_scp(path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .map_err(|e| PrepError::io(format!("reading file list {}", path.display()), e))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(char::is_whitespace) {
            Some((_, rest)) => PathBuf::from(rest.trim()),
            None => PathBuf::from(line),
        })
        .collect())
}

fn open(path: &Path) -> Result<hound::WavReader<std::io::BufReader<fs::File>>> {
    hound::WavReader::open(path).map_err(|e| PrepError::wav(format!("opening {}", path.display()), e))
}

/// Reads up to `frames` frames of the first channel from the reader's position.
fn read_first_channel<R: Read>(
    reader: &mut hound::WavReader<R>,
    frames: usize,
    path: &Path,
) -> Result<Vec<f32>> {
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;
    let context = || format!("reading {}", path.display());
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .take(frames * channels)
            .step_by(channels)
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| PrepError::wav(context(), e))?,
        hound::SampleFormat::Int => {
            let max_val = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .take(frames * channels)
                .step_by(channels)
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| PrepError::wav(context(), e))?
        }
    };
    Ok(samples)
}

/// Reads a whole file, keeping the first channel of multi-channel audio.
pub fn read_wav_mono(path: impl AsRef<Path>) -> Result<(Vec<f32>, u32)> {
    let path = path.as_ref();
    let mut reader = open(path)?;
    let frames = reader.duration() as usize;
    let sample_rate = reader.spec().sample_rate;
    let samples = read_first_channel(&mut reader, frames, path)?;
    Ok((samples, sample_rate))
}

/// Writes interleaved f32 samples as a 32-bit float WAV file.
pub fn write_wav(path: impl AsRef<Path>, samples: &[f32], sample_rate: u32, channels: u16) -> Result<()> {
    let path = path.as_ref();
    let context = || format!("writing {}", path.display());
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| PrepError::wav(context(), e))?;
    for &s in samples {
        writer.write_sample(s).map_err(|e| PrepError::wav(context(), e))?;
    }
    writer.finalize().map_err(|e| PrepError::wav(context(), e))
}

/// Produces exactly `nsamples` of noise from a clip of any length.
///
/// Shorter clips are tiled around a random offset; longer clips are read
/// from a random offset.
pub fn read_noise(path: impl AsRef<Path>, nsamples: usize, rng: &mut dyn RngCore) -> Result<Vec<f32>> {
    let path = path.as_ref();
    let mut reader = open(path)?;
    let frames = reader.duration() as usize;
    if frames == 0 {
        return Err(PrepError::io(
            format!("reading {}", path.display()),
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "noise file has no frames"),
        ));
    }

    if frames > nsamples {
        let offset = rng.random_range(0..frames - nsamples);
        seek(&mut reader, offset, path)?;
        let noise = read_first_channel(&mut reader, nsamples, path)?;
        if noise.len() != nsamples {
            return Err(PrepError::io(
                format!("reading {}", path.display()),
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("expected {nsamples} frames, got {}", noise.len()),
                ),
            ));
        }
        return Ok(noise);
    }

    let clip = read_first_channel(&mut reader, frames, path)?;
    if frames == nsamples {
        return Ok(clip);
    }
    let offset = rng.random_range(0..nsamples - frames);
    Ok(wrap_pad(&clip, offset, nsamples))
}

fn seek<R: Read + Seek>(reader: &mut hound::WavReader<R>, frame: usize, path: &Path) -> Result<()> {
    let frame = u32::try_from(frame).map_err(|_| {
        PrepError::invalid_argument(format!("seek offset {frame} too large for {}", path.display()))
    })?;
    reader
        .seek(frame)
        .map_err(|e| PrepError::io(format!("seeking in {}", path.display()), e))
}

/// Tiles `clip` so that `clip[0]` lands at `offset`.
pub fn wrap_pad(clip: &[f32], offset: usize, len: usize) -> Vec<f32> {
    if clip.is_empty() {
        return vec![0.0; len];
    }
    let n = clip.len();
    let shift = n - offset % n;
    (0..len).map(|i| clip[(i + shift) % n]).collect()
}
