use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::stft::SpectrogramMatrix;
use crate::settings::ResolvedSettings;

/// Added inside logarithms so silent bins stay finite.
pub const EPSILON: f64 = 1e-10;

/// Parameters of the magnitude-to-gray mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneParams {
    pub dynamic_range_db: f64,
    pub gamma: f64,
    pub contrast: f64,
    pub log_amplitude: bool,
    pub dithering: bool,
    pub dither_seed: Option<u64>,
}

impl ToneParams {
    pub fn from_settings(settings: &ResolvedSettings) -> Self {
        Self {
            dynamic_range_db: settings.dynamic_range_db,
            gamma: settings.gamma,
            contrast: settings.contrast,
            log_amplitude: settings.log_amplitude,
            dithering: settings.dithering,
            dither_seed: settings.dither_seed,
        }
    }
}

/// Maps raw magnitudes onto display intensities in `[0, 1]`, where 0 is black
/// ink and 1 is blank paper.
///
/// Per cell: dB compression against the global maximum windowed to the
/// dynamic range (or plain ratio in linear mode), gamma, inversion and 8-bit
/// quantization, optional +/-0.5 LSB dither, then contrast around mid-gray.
pub struct ToneMapper {
    params: ToneParams,
    max_db: f64,
    global_max: f64,
    rng: Option<StdRng>,
}

impl ToneMapper {
    pub fn new(params: ToneParams, global_max: f64) -> Self {
        let rng = params.dithering.then(|| match params.dither_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        });
        Self {
            params,
            max_db: 20.0 * (global_max + EPSILON).log10(),
            global_max,
            rng,
        }
    }

    /// Intensity for one magnitude.
    pub fn map(&mut self, magnitude: f64) -> f64 {
        let mut intensity = if self.params.log_amplitude {
            let db = 20.0 * (magnitude + EPSILON).log10();
            let floor = self.max_db - self.params.dynamic_range_db;
            ((db - floor) / self.params.dynamic_range_db).clamp(0.0, 1.0)
        } else if self.global_max > 0.0 {
            (magnitude / self.global_max).clamp(0.0, 1.0)
        } else {
            0.0
        };

        if self.params.gamma != 1.0 {
            intensity = intensity.powf(1.0 / self.params.gamma);
        }

        let mut level = (1.0 - intensity) * 255.0;
        if let Some(rng) = self.rng.as_mut() {
            level += rng.gen::<f64>() - 0.5;
        }
        let level = level.clamp(0.0, 255.0);

        let contrasted = (level / 255.0 - 0.5) * self.params.contrast + 0.5;
        if contrasted.is_nan() {
            return 1.0;
        }
        contrasted.clamp(0.0, 1.0)
    }
}

/// Tone-map every stored cell of `matrix` in place.
pub fn apply_tone_mapping(matrix: &mut SpectrogramMatrix, params: ToneParams) {
    let mut mapper = ToneMapper::new(params, matrix.global_max());
    debug!(
        "Tone mapping {} cells: DR {:.1} dB, gamma {:.2}, contrast {:.2}, dither {}",
        matrix.values().len(),
        params.dynamic_range_db,
        params.gamma,
        params.contrast,
        params.dithering
    );
    for value in matrix.values_mut() {
        *value = mapper.map(*value);
    }
}
