//! Physically scaled spectrograms for print.
//!
//! A WAV recording is analysed with a zero-padded short-time Fourier
//! transform, tone-mapped to grayscale, and laid out so that one centimetre
//! of page width corresponds to a fixed stretch of audio (the writing speed).
//! Pages are written as PNG at the printer resolution or as a one-page PDF.
//!
//! ```rust,no_run
//! use std::path::Path;
//! use spectroprint::{generate, GenerationSettings};
//!
//! let settings = GenerationSettings { vertical_scale: Some(true), ..Default::default() };
//! let report = generate(Path::new("take1.wav"), Path::new("take1.pdf"), &settings, None, &mut |_| {})?;
//! println!("{:.2}s on the page", report.visible_duration);
//! # Ok::<(), spectroprint::SpectroError>(())
//! ```

pub mod analysis;
pub mod audio;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod settings;

pub use error::{Result, SpectroError};
pub use pipeline::{generate, generate_preview, GenerationReport, Milestone};
pub use settings::{GenerationSettings, OutputKind, OverlapPreset, PageFormat, ResolvedSettings};
