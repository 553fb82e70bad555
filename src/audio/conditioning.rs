use std::f64::consts::PI;

use log::debug;

pub const MIN_HIGH_PASS_ORDER: u32 = 1;
pub const MAX_HIGH_PASS_ORDER: u32 = 12;

const MIN_HIGH_PASS_ALPHA: f64 = 0.1;
const MAX_HIGH_PASS_ALPHA: f64 = 0.95;

/// First-difference high-frequency boost: `y[n] = x[n] - alpha * x[n-1]`.
pub fn pre_emphasis(mut samples: Vec<f64>, alpha: f64) -> Vec<f64> {
    let mut previous = match samples.first() {
        Some(&first) => first,
        None => return samples,
    };
    for sample in samples.iter_mut().skip(1) {
        let current = *sample;
        *sample = current - alpha * previous;
        previous = current;
    }
    samples
}

/// Single-pole high-pass coefficient for a cutoff, clamped to a stable range.
pub fn high_pass_alpha(cutoff_hz: f64, sample_rate: u32) -> f64 {
    let rc = 1.0 / (2.0 * PI * cutoff_hz);
    let dt = 1.0 / sample_rate as f64;
    (rc / (rc + dt)).clamp(MIN_HIGH_PASS_ALPHA, MAX_HIGH_PASS_ALPHA)
}

/// Cascaded single-pole high-pass filter.
///
/// `order` is clamped to 1..=12 and realized as that many passes of
/// `y[n] = a * (y[n-1] + x[n] - x[n-1])`. Cascading can shrink or inflate
/// the level considerably, so if the output peak lands outside 1%..200% of
/// the input peak it is rescaled back to the input peak.
pub fn high_pass(mut samples: Vec<f64>, cutoff_hz: f64, sample_rate: u32, order: u32) -> Vec<f64> {
    if samples.is_empty() {
        return samples;
    }
    let order = order.clamp(MIN_HIGH_PASS_ORDER, MAX_HIGH_PASS_ORDER);
    let alpha = high_pass_alpha(cutoff_hz, sample_rate);
    let input_peak = peak(&samples);

    for _ in 0..order {
        let mut previous_in = samples[0];
        let mut previous_out = samples[0];
        for sample in samples.iter_mut().skip(1) {
            let current = *sample;
            let out = alpha * (previous_out + current - previous_in);
            *sample = out;
            previous_in = current;
            previous_out = out;
        }
    }

    let output_peak = peak(&samples);
    if input_peak > 0.0
        && output_peak > 0.0
        && (output_peak < 0.01 * input_peak || output_peak > 2.0 * input_peak)
    {
        debug!(
            "High-pass order {} moved peak {:.4} -> {:.4}; rescaling",
            order, input_peak, output_peak
        );
        let gain = input_peak / output_peak;
        samples.iter_mut().for_each(|s| *s *= gain);
    }
    samples
}

/// A pure sine tone, used for calibration files.
pub fn sine_wave(len: usize, sample_rate: u32, frequency: f64, amplitude: f64) -> Vec<f64> {
    let step = 2.0 * PI * frequency / sample_rate as f64;
    (0..len).map(|n| amplitude * (step * n as f64).sin()).collect()
}

fn peak(samples: &[f64]) -> f64 {
    samples.iter().fold(0.0f64, |acc, s| acc.max(s.abs()))
}
