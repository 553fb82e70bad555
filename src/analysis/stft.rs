use std::sync::Arc;

use log::{debug, info, warn};
use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};

use super::planner::TransformPlan;
use crate::error::{try_buffer, Result, SpectroError};

/// A requested display band in Hz. Construction fails for empty or inverted
/// ranges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyRange {
    pub min_hz: f64,
    pub max_hz: f64,
}

impl FrequencyRange {
    pub fn new(min_hz: f64, max_hz: f64) -> Result<Self> {
        if !(min_hz.is_finite() && max_hz.is_finite()) || min_hz < 0.0 || min_hz >= max_hz {
            return Err(SpectroError::InvalidRange { min_hz, max_hz });
        }
        Ok(Self { min_hz, max_hz })
    }
}

/// Inclusive bin indices kept for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinRange {
    pub min: usize,
    pub max: usize,
}

impl BinRange {
    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.max - self.min + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.max < self.min
    }
}

/// Hz covered by one bin of a `padded_size` FFT.
pub fn frequency_resolution(sample_rate: u32, padded_size: usize) -> f64 {
    sample_rate as f64 / padded_size as f64
}

/// Nearest bin to `freq_hz`, clamped to the valid bins.
pub fn bin_for_frequency(freq_hz: f64, sample_rate: u32, padded_size: usize) -> usize {
    let bin = (freq_hz / frequency_resolution(sample_rate, padded_size)).round().max(0.0) as usize;
    bin.min(padded_size / 2)
}

pub fn frequency_for_bin(bin: usize, sample_rate: u32, padded_size: usize) -> f64 {
    bin as f64 * frequency_resolution(sample_rate, padded_size)
}

/// Bins covering `range`, rounded outward so the band contains the request.
pub fn bin_range(range: FrequencyRange, sample_rate: u32, padded_size: usize) -> Result<BinRange> {
    let resolution = frequency_resolution(sample_rate, padded_size);
    let last = padded_size / 2;
    let min = ((range.min_hz / resolution).floor() as usize).min(last);
    let max = ((range.max_hz / resolution).ceil() as usize).min(last);
    if min >= max {
        return Err(SpectroError::InvalidRange { min_hz: range.min_hz, max_hz: range.max_hz });
    }
    Ok(BinRange { min, max })
}

/// `0.5 * (1 - cos(2 pi i / (N - 1)))`
pub fn hann_window(size: usize) -> Vec<f64> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f64::consts::PI * i as f64 / (size - 1) as f64;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Magnitudes for every (window, bin) pair of the displayed band.
///
/// Rows are windows; each row holds the bins `bin_index_min..=bin_index_max`.
/// Bins outside the band are never drawn so they are not kept, but
/// `global_max` covers every bin of every window.
#[derive(Debug, Clone)]
pub struct SpectrogramMatrix {
    values: Vec<f64>,
    num_windows: usize,
    bins: BinRange,
    num_bins: usize,
    frequency_resolution: f64,
    global_max: f64,
    range_reset: bool,
    display_min_hz: f64,
    display_max_hz: f64,
}

impl SpectrogramMatrix {
    pub fn num_windows(&self) -> usize {
        self.num_windows
    }

    /// Total bins of the transform, `padded_size / 2 + 1`.
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    pub fn bin_index_min(&self) -> usize {
        self.bins.min
    }

    pub fn bin_index_max(&self) -> usize {
        self.bins.max
    }

    pub fn band_len(&self) -> usize {
        self.bins.len()
    }

    pub fn frequency_resolution(&self) -> f64 {
        self.frequency_resolution
    }

    pub fn frequency_for_bin(&self, bin: usize) -> f64 {
        bin as f64 * self.frequency_resolution
    }

    pub fn global_max(&self) -> f64 {
        self.global_max
    }

    /// True when the requested range was degenerate and the full spectrum was used.
    pub fn range_reset(&self) -> bool {
        self.range_reset
    }

    /// Frequency range the vertical axis should span, in Hz.
    pub fn display_range(&self) -> (f64, f64) {
        (self.display_min_hz, self.display_max_hz)
    }

    /// Value at `window` for absolute bin index `bin`.
    pub fn get(&self, window: usize, bin: usize) -> f64 {
        self.values[window * self.bins.len() + (bin - self.bins.min)]
    }

    /// One window's band, lowest bin first.
    pub fn window(&self, window: usize) -> &[f64] {
        let len = self.bins.len();
        &self.values[window * len..(window + 1) * len]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    /// Build a matrix from precomputed rows. Used by tests and benches.
    pub fn from_rows(rows: &[Vec<f64>], bins: BinRange, num_bins: usize, frequency_resolution: f64) -> Self {
        let values: Vec<f64> = rows.iter().flat_map(|row| row.iter().copied()).collect();
        let global_max = values.iter().fold(0.0f64, |acc, &v| acc.max(v));
        Self {
            values,
            num_windows: rows.len(),
            bins,
            num_bins,
            frequency_resolution,
            global_max,
            range_reset: false,
            display_min_hz: bins.min.max(1) as f64 * frequency_resolution,
            display_max_hz: bins.max as f64 * frequency_resolution,
        }
    }
}

/// Windowed, zero-padded real FFT over a whole signal.
///
/// # Architecture Role
/// Sits between the resolution planner and the tone mapper. Owns the FFT plan
/// and its scratch buffers for the duration of one generation call; nothing
/// is cached across calls.
pub struct StftEngine {
    plan: TransformPlan,
    fft: Arc<dyn RealToComplex<f64>>,
    window: Vec<f64>,
    input: Vec<f64>,
    spectrum: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl StftEngine {
    pub fn new(plan: TransformPlan) -> Result<Self> {
        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(plan.padded_size);
        let input = try_buffer("FFT input", plan.padded_size, 0.0f64)?;
        let spectrum = try_buffer("FFT output", plan.num_bins(), Complex::new(0.0, 0.0))?;
        let scratch = fft.make_scratch_vec();

        Ok(Self {
            plan,
            fft,
            window: hann_window(plan.window_size),
            input,
            spectrum,
            scratch,
        })
    }

    pub fn plan(&self) -> &TransformPlan {
        &self.plan
    }

    /// Number of full windows that fit in `total` samples.
    pub fn window_count(&self, total: usize) -> Result<usize> {
        if total < self.plan.window_size {
            return Err(SpectroError::SignalTooShort {
                samples: total,
                window_size: self.plan.window_size,
            });
        }
        Ok((total - self.plan.window_size) / self.plan.hop_size + 1)
    }

    /// Run the transform over `samples` and keep the bins of `range`.
    ///
    /// A degenerate range is not fatal: the full spectrum is used instead and
    /// the matrix records the reset.
    pub fn compute(
        &mut self,
        samples: &[f64],
        sample_rate: u32,
        range: Result<FrequencyRange>,
    ) -> Result<SpectrogramMatrix> {
        let num_windows = self.window_count(samples.len())?;
        let num_bins = self.plan.num_bins();
        let resolution = frequency_resolution(sample_rate, self.plan.padded_size);
        let nyquist = sample_rate as f64 / 2.0;

        let checked = range.and_then(|r| bin_range(r, sample_rate, self.plan.padded_size).map(|bins| (r, bins)));
        let (bins, display_min_hz, display_max_hz, range_reset) = match checked {
            Ok((requested, bins)) => (
                bins,
                requested.min_hz.max(resolution),
                requested.max_hz.min(nyquist),
                false,
            ),
            Err(err) => {
                warn!("{}; using the full spectrum 0-{:.0} Hz", err, nyquist);
                (BinRange { min: 0, max: num_bins - 1 }, resolution, nyquist, true)
            }
        };

        let band_len = bins.len();
        let mut values = try_buffer("spectrogram matrix", num_windows * band_len, 0.0f64)?;
        let mut global_max = 0.0f64;

        info!(
            "STFT: {} windows of {} (hop {}, padded {}), bins {}..={} ({:.3} Hz/bin)",
            num_windows,
            self.plan.window_size,
            self.plan.hop_size,
            self.plan.padded_size,
            bins.min,
            bins.max,
            resolution
        );

        for (index, row) in values.chunks_exact_mut(band_len).enumerate() {
            let start = index * self.plan.hop_size;
            self.load_window(&samples[start..]);
            self.fft
                .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
                .map_err(|e| SpectroError::render(format!("FFT failed: {}", e)))?;

            for (bin, value) in self.spectrum.iter().enumerate() {
                let magnitude = value.norm();
                if magnitude > global_max {
                    global_max = magnitude;
                }
                if bin >= bins.min && bin <= bins.max {
                    row[bin - bins.min] = magnitude;
                }
            }
        }

        debug!("STFT global max magnitude {:.6}", global_max);

        Ok(SpectrogramMatrix {
            values,
            num_windows,
            bins,
            num_bins,
            frequency_resolution: resolution,
            global_max,
            range_reset,
            display_min_hz,
            display_max_hz,
        })
    }

    fn load_window(&mut self, samples: &[f64]) {
        let window_size = self.plan.window_size;
        for (i, slot) in self.input[..window_size].iter_mut().enumerate() {
            *slot = samples.get(i).copied().unwrap_or(0.0) * self.window[i];
        }
        self.input[window_size..].fill(0.0);
    }
}

/// Convenience wrapper: plan buffers, transform, release.
pub fn compute_spectrogram(
    samples: &[f64],
    sample_rate: u32,
    plan: TransformPlan,
    min_hz: f64,
    max_hz: f64,
) -> Result<SpectrogramMatrix> {
    let mut engine = StftEngine::new(plan)?;
    engine.compute(samples, sample_rate, FrequencyRange::new(min_hz, max_hz))
}
