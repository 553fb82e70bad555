pub mod planner;
pub mod stft;
pub mod tone;

pub use planner::{
    bins_per_second_from_slider, clamp_bins_per_second, max_bins_per_second, plan_transform, ClampedResolution,
    TransformPlan, ZERO_PAD_SIZE,
};
pub use stft::{compute_spectrogram, BinRange, FrequencyRange, SpectrogramMatrix, StftEngine};
pub use tone::{apply_tone_mapping, ToneMapper, ToneParams};
