pub mod conditioning;
pub mod loader;

pub use conditioning::{high_pass, pre_emphasis, sine_wave};
pub use loader::{load_wav, normalize_peak, read_wav_info, AudioSignal, LoadOptions, WavInfo};
