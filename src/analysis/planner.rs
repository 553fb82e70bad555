use log::{debug, warn};
use serde::Serialize;

use crate::settings::{OverlapPreset, MIN_BINS_PER_SECOND};

/// Every window is zero-extended to at least this many samples before the FFT.
pub const ZERO_PAD_SIZE: usize = 65536;

const CM_PER_INCH: f64 = 2.54;

/// Window sizes and spacing for one STFT pass.
///
/// Fields are public so analysis code and tests can build a plan directly,
/// e.g. with a smaller `padded_size` than the production constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TransformPlan {
    pub window_size: usize,
    pub padded_size: usize,
    pub hop_size: usize,
    pub overlap_ratio: f64,
}

impl TransformPlan {
    /// Number of magnitude bins a real FFT of `padded_size` yields.
    pub fn num_bins(&self) -> usize {
        self.padded_size / 2 + 1
    }

    /// Exact windows-per-second rate once the hop is rounded to whole samples.
    pub fn effective_bins_per_second(&self, sample_rate: u32) -> f64 {
        sample_rate as f64 / self.hop_size as f64
    }
}

/// Derive window, hop and padded sizes from the requested time density.
///
/// The hop is the number of samples between window starts. The window is the
/// smallest power of two that gives at least the preset's overlap. An explicit
/// override replaces the computed window but is still rounded up to a power
/// of two no smaller than the hop.
pub fn plan_transform(
    sample_rate: u32,
    bins_per_second: f64,
    preset: OverlapPreset,
    fft_size_override: Option<usize>,
) -> TransformPlan {
    let overlap_ratio = preset.ratio();
    let hop_size = ((sample_rate as f64 / bins_per_second).floor() as usize).max(1);

    let window_size = match fft_size_override {
        Some(requested) => {
            let size = requested.max(hop_size).next_power_of_two();
            if size != requested {
                warn!("FFT size {} adjusted to {} (power of two, at least the hop of {})", requested, size, hop_size);
            }
            size
        }
        None => {
            let minimum = (hop_size as f64 / (1.0 - overlap_ratio)).ceil() as usize;
            minimum.max(1).next_power_of_two()
        }
    };

    let plan = TransformPlan {
        window_size,
        padded_size: window_size.max(ZERO_PAD_SIZE),
        hop_size,
        overlap_ratio,
    };
    debug!("Transform plan: {:?}", plan);
    plan
}

/// Highest bins-per-second the printer can resolve at a writing speed:
/// one window per printer dot.
pub fn max_bins_per_second(writing_speed: f64, printer_dpi: u32) -> f64 {
    (printer_dpi as f64 / CM_PER_INCH * writing_speed).floor()
}

/// A bins-per-second value after fitting it to the printable range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClampedResolution {
    pub bins_per_second: f64,
    pub resolution_limited: bool,
}

/// Clamp a requested density to `[MIN_BINS_PER_SECOND, printable maximum]`.
/// `resolution_limited` reports whether the request had to change.
pub fn clamp_bins_per_second(requested: f64, writing_speed: f64, printer_dpi: u32) -> ClampedResolution {
    let ceiling = max_bins_per_second(writing_speed, printer_dpi).max(MIN_BINS_PER_SECOND);
    let bins_per_second = requested.clamp(MIN_BINS_PER_SECOND, ceiling);
    let resolution_limited = bins_per_second != requested;
    if resolution_limited {
        warn!(
            "Bins per second {:.1} outside printable range {:.0}..{:.0}; using {:.1}",
            requested, MIN_BINS_PER_SECOND, ceiling, bins_per_second
        );
    }
    ClampedResolution { bins_per_second, resolution_limited }
}

/// Map a 0..1 resolution slider onto bins-per-second.
///
/// The first half of the travel covers 100% to 75% of the printable maximum,
/// the second half 75% down to 20%. Results at 95% of the maximum or more are
/// flagged as resolution limited.
pub fn bins_per_second_from_slider(slider: f64, writing_speed: f64, printer_dpi: u32) -> ClampedResolution {
    let slider = slider.clamp(0.0, 1.0);
    let ceiling = max_bins_per_second(writing_speed, printer_dpi);
    let fraction = if slider <= 0.5 {
        0.75 + 0.25 * (1.0 - 2.0 * slider)
    } else {
        0.75 - 0.55 * (2.0 * slider - 1.0)
    };
    let clamped = clamp_bins_per_second(ceiling * fraction, writing_speed, printer_dpi);
    ClampedResolution {
        bins_per_second: clamped.bins_per_second,
        resolution_limited: clamped.bins_per_second >= 0.95 * ceiling,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_case_48k_150bps_medium() {
        let plan = plan_transform(48000, 150.0, OverlapPreset::Medium, None);
        assert_eq!(plan.hop_size, 320);
        // ceil(320 / 0.4) = 800 -> 1024
        assert_eq!(plan.window_size, 1024);
        assert_eq!(plan.padded_size, ZERO_PAD_SIZE);
        assert_eq!(plan.num_bins(), ZERO_PAD_SIZE / 2 + 1);
    }

    #[test]
    fn test_window_is_power_of_two_at_least_hop() {
        let presets = [OverlapPreset::Low, OverlapPreset::Medium, OverlapPreset::High];
        for &rate in &[8000u32, 22050, 44100, 48000, 96000] {
            for &bps in &[1.0, 20.0, 75.5, 150.0, 787.0, 5000.0, 1.0e6] {
                for &preset in &presets {
                    for &fft in &[None, Some(1), Some(1000), Some(4096)] {
                        let plan = plan_transform(rate, bps, preset, fft);
                        assert!(plan.window_size.is_power_of_two(), "{:?}", plan);
                        assert!(plan.window_size >= plan.hop_size, "{:?}", plan);
                        assert!(plan.hop_size >= 1);
                        assert!(plan.padded_size >= plan.window_size);
                    }
                }
            }
        }
    }

    #[test]
    fn test_override_replaces_computed_window() {
        let plan = plan_transform(48000, 150.0, OverlapPreset::High, Some(4096));
        assert_eq!(plan.window_size, 4096);

        // Too small for the hop: raised to cover it
        let plan = plan_transform(48000, 20.0, OverlapPreset::Low, Some(256));
        assert_eq!(plan.hop_size, 2400);
        assert_eq!(plan.window_size, 4096);
    }

    #[test]
    fn test_higher_overlap_never_shrinks_window() {
        let low = plan_transform(44100, 100.0, OverlapPreset::Low, None);
        let high = plan_transform(44100, 100.0, OverlapPreset::High, None);
        assert_eq!(low.hop_size, high.hop_size);
        assert!(high.window_size >= low.window_size);
    }

    #[test]
    fn test_printable_ceiling() {
        // 800 dpi at 2.5 cm/s: 314.96 dots/cm * 2.5 = 787.4
        assert_eq!(max_bins_per_second(2.5, 800), 787.0);

        let fine = clamp_bins_per_second(150.0, 2.5, 800);
        assert_eq!(fine.bins_per_second, 150.0);
        assert!(!fine.resolution_limited);

        let capped = clamp_bins_per_second(2000.0, 2.5, 800);
        assert_eq!(capped.bins_per_second, 787.0);
        assert!(capped.resolution_limited);

        let floored = clamp_bins_per_second(5.0, 2.5, 800);
        assert_eq!(floored.bins_per_second, MIN_BINS_PER_SECOND);
        assert!(floored.resolution_limited);
    }

    #[test]
    fn test_slider_mapping() {
        let finest = bins_per_second_from_slider(0.0, 2.5, 800);
        assert_eq!(finest.bins_per_second, 787.0);
        assert!(finest.resolution_limited);

        let middle = bins_per_second_from_slider(0.5, 2.5, 800);
        assert!((middle.bins_per_second - 787.0 * 0.75).abs() < 1e-9);
        assert!(!middle.resolution_limited);

        let coarsest = bins_per_second_from_slider(1.0, 2.5, 800);
        assert!((coarsest.bins_per_second - 787.0 * 0.20).abs() < 1e-9);
    }
}
