use std::path::Path;

use hound::{SampleFormat, WavReader};
use log::{info, warn};

use crate::error::{try_buffer, Result, SpectroError};

/// Mono audio ready for analysis.
#[derive(Debug, Clone)]
pub struct AudioSignal {
    pub samples: Vec<f64>,
    pub sample_rate: u32,
    /// Where the loaded segment begins within the source file, in seconds
    pub start_offset_s: f64,
    /// Length of the whole source file, in seconds
    pub source_duration_s: f64,
}

impl AudioSignal {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Which part of the file to load and how.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadOptions {
    pub start_time: f64,
    /// 0 reads to the end of the file
    pub duration: f64,
    pub normalize: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            duration: 0.0,
            normalize: true,
        }
    }
}

/// Header facts about a WAV file, read without decoding any samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub frames: u32,
}

impl WavInfo {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames as f64 / self.sample_rate as f64
    }
}

pub fn read_wav_info<P: AsRef<Path>>(path: P) -> Result<WavInfo> {
    let path = path.as_ref();
    let reader = WavReader::open(path).map_err(|e| hound_error(path, e))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(SpectroError::decode(path, "sample rate is zero"));
    }
    Ok(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        frames: reader.duration(),
    })
}

/// Decode a WAV file into a mono signal at its native sample rate.
///
/// Channels are averaged per frame. The start offset is clamped to the file
/// length and the duration to what remains after it; the segment is never
/// padded out. Integer PCM is scaled to [-1, 1) by its bit depth.
pub fn load_wav<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<AudioSignal> {
    let path = path.as_ref();
    let mut reader = WavReader::open(path).map_err(|e| hound_error(path, e))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;
    let sample_rate = spec.sample_rate;
    if sample_rate == 0 {
        return Err(SpectroError::decode(path, "sample rate is zero"));
    }

    let total_frames = reader.duration() as usize;
    let rate = sample_rate as f64;
    let start_frame = ((options.start_time.max(0.0) * rate).floor() as usize).min(total_frames);
    let remaining = total_frames - start_frame;
    let frames = if options.duration > 0.0 {
        ((options.duration * rate).round() as usize).min(remaining)
    } else {
        remaining
    };
    if start_frame == total_frames && total_frames > 0 {
        warn!("Start offset {:.2}s is past the end of {}", options.start_time, path.display());
    }

    info!(
        "Loading {}: {} Hz, {} channel(s), {}-bit {:?}, frames {}..{}",
        path.display(),
        sample_rate,
        channels,
        spec.bits_per_sample,
        spec.sample_format,
        start_frame,
        start_frame + frames
    );

    reader
        .seek(start_frame as u32)
        .map_err(|e| SpectroError::io(path, e))?;

    let mut samples = try_buffer("audio samples", frames, 0.0f64)?;
    let decoded = match spec.sample_format {
        SampleFormat::Float => downmix(
            path,
            reader.samples::<f32>().map(|s| s.map(f64::from)),
            channels,
            &mut samples,
        )?,
        SampleFormat::Int => {
            let full_scale = (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f64;
            downmix(
                path,
                reader.samples::<i32>().map(|s| s.map(|v| v as f64 / full_scale)),
                channels,
                &mut samples,
            )?
        }
    };
    if decoded < frames {
        warn!("{} ended early: decoded {} of {} frames", path.display(), decoded, frames);
        samples.truncate(decoded);
    }

    if options.normalize {
        normalize_peak(&mut samples);
    }

    Ok(AudioSignal {
        samples,
        sample_rate,
        start_offset_s: start_frame as f64 / rate,
        source_duration_s: total_frames as f64 / rate,
    })
}

/// Scale so the largest absolute sample is 1.0. Silence is left untouched.
pub fn normalize_peak(samples: &mut [f64]) {
    let peak = samples.iter().fold(0.0f64, |acc, s| acc.max(s.abs()));
    if peak > 0.0 {
        let gain = 1.0 / peak;
        samples.iter_mut().for_each(|s| *s *= gain);
    }
}

fn downmix<I>(path: &Path, interleaved: I, channels: usize, out: &mut [f64]) -> Result<usize>
where
    I: Iterator<Item = hound::Result<f64>>,
{
    let mut frame = 0;
    let mut channel = 0;
    let mut sum = 0.0;
    for sample in interleaved.take(out.len() * channels) {
        sum += sample.map_err(|e| hound_error(path, e))?;
        channel += 1;
        if channel == channels {
            out[frame] = sum / channels as f64;
            frame += 1;
            channel = 0;
            sum = 0.0;
        }
    }
    Ok(frame)
}

fn hound_error(path: &Path, err: hound::Error) -> SpectroError {
    match err {
        hound::Error::IoError(io) => SpectroError::io(path, io),
        other => SpectroError::decode(path, other),
    }
}
