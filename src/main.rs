use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use spectroprint::{generate, GenerationSettings, Milestone, OutputKind, OverlapPreset, PageFormat};

#[derive(Parser)]
#[command(name = "spectroprint")]
#[command(about = "Render a WAV recording as a print-scaled spectrogram (PNG or PDF)")]
struct Args {
    /// WAV file to analyse
    #[arg()]
    input: PathBuf,

    /// Output file; the extension picks the format unless --kind is given
    #[arg(short, long)]
    output: PathBuf,

    /// Settings file (JSON); command line values override it
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum)]
    kind: Option<OutputKind>,

    /// Write a JSON report of the generation here
    #[arg(long)]
    report: Option<PathBuf>,

    /// Save the effective settings as JSON and continue
    #[arg(long)]
    save_settings: Option<PathBuf>,

    /// Start offset in seconds
    #[arg(long)]
    start: Option<f64>,

    /// Seconds to analyse (default: to the end of the file)
    #[arg(long)]
    duration: Option<f64>,

    /// Analysis windows per second of audio
    #[arg(long)]
    bins_per_second: Option<f64>,

    /// Resolution slider, 0 (finest) to 1 (coarsest); overrides --bins-per-second
    #[arg(long)]
    resolution: Option<f64>,

    #[arg(long, value_enum)]
    overlap: Option<OverlapPreset>,

    /// Explicit FFT window size
    #[arg(long)]
    fft_size: Option<u32>,

    #[arg(long)]
    min_freq: Option<f64>,

    #[arg(long)]
    max_freq: Option<f64>,

    #[arg(long)]
    dynamic_range: Option<f64>,

    #[arg(long)]
    gamma: Option<f64>,

    #[arg(long)]
    contrast: Option<f64>,

    #[arg(long)]
    dither: bool,

    /// Seed for reproducible dithering
    #[arg(long)]
    dither_seed: Option<u64>,

    /// Linear amplitude instead of dB
    #[arg(long)]
    linear_amplitude: bool,

    /// Linear frequency axis instead of octaves
    #[arg(long)]
    linear_frequency: bool,

    /// Disable the high-frequency boost
    #[arg(long)]
    no_boost: bool,

    /// Enable the high-pass filter with this cutoff (Hz)
    #[arg(long)]
    high_pass: Option<f64>,

    #[arg(long)]
    high_pass_order: Option<u32>,

    /// Keep the recorded level instead of normalizing
    #[arg(long)]
    no_normalize: bool,

    #[arg(long, value_enum)]
    page: Option<PageFormat>,

    /// Writing speed in cm/s
    #[arg(long)]
    writing_speed: Option<f64>,

    #[arg(long)]
    dpi: Option<u32>,

    /// Box blur radius in pixels (PNG only)
    #[arg(long)]
    blur: Option<u32>,

    #[arg(long)]
    vertical_scale: bool,

    #[arg(long)]
    reference_lines: bool,

    #[arg(long)]
    parameter_text: bool,
}

impl Args {
    fn apply(&self, settings: &mut GenerationSettings) {
        fn set<T: Copy>(target: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *target = value;
            }
        }
        fn flag(target: &mut Option<bool>, on: bool) {
            if on {
                *target = Some(true);
            }
        }

        set(&mut settings.start_time, self.start);
        set(&mut settings.duration, self.duration);
        set(&mut settings.bins_per_second, self.bins_per_second);
        set(&mut settings.fft_size, self.fft_size.map(i64::from));
        set(&mut settings.min_freq, self.min_freq);
        set(&mut settings.max_freq, self.max_freq);
        set(&mut settings.dynamic_range_db, self.dynamic_range);
        set(&mut settings.gamma, self.gamma);
        set(&mut settings.contrast, self.contrast);
        set(&mut settings.high_pass_order, self.high_pass_order.map(i64::from));
        set(&mut settings.writing_speed, self.writing_speed);
        set(&mut settings.printer_dpi, self.dpi.map(i64::from));
        set(&mut settings.blur_radius, self.blur.map(i64::from));
        if self.resolution.is_some() {
            settings.resolution_slider = self.resolution;
        }
        if self.overlap.is_some() {
            settings.overlap_preset = self.overlap;
        }
        if self.page.is_some() {
            settings.page_format = self.page;
        }
        if self.dither_seed.is_some() {
            settings.dither_seed = self.dither_seed;
        }
        if let Some(cutoff) = self.high_pass {
            settings.high_pass = Some(true);
            settings.high_pass_cutoff = cutoff;
        }

        flag(&mut settings.dithering, self.dither);
        flag(&mut settings.vertical_scale, self.vertical_scale);
        flag(&mut settings.top_reference_line, self.reference_lines);
        flag(&mut settings.bottom_reference_line, self.reference_lines);
        flag(&mut settings.parameter_text, self.parameter_text);
        if self.linear_amplitude {
            settings.log_amplitude = Some(false);
        }
        if self.linear_frequency {
            settings.log_frequency = Some(false);
        }
        if self.no_boost {
            settings.pre_emphasis = Some(false);
        }
        if self.no_normalize {
            settings.normalize = Some(false);
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut settings = match &args.settings {
        Some(path) => GenerationSettings::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => GenerationSettings::default(),
    };
    args.apply(&mut settings);

    if let Some(path) = &args.save_settings {
        settings
            .save(path)
            .with_context(|| format!("Failed to save settings to {}", path.display()))?;
        info!("Settings saved to {}", path.display());
    }

    info!("Input file: {}", args.input.display());
    info!("Output file: {}", args.output.display());

    let mut progress = |milestone: Milestone| info!("Stage: {:?}", milestone);
    let report = generate(&args.input, &args.output, &settings, args.kind, &mut progress)
        .with_context(|| format!("Failed to render {}", args.input.display()))?;

    info!("=== GENERATION RESULTS ===");
    info!("Sample rate: {} Hz", report.sample_rate);
    info!("Bins per second: {:.1} (requested {:.1})", report.bins_per_second, report.requested_bins_per_second);
    if report.resolution_limited {
        info!("Resolution limited by the printer: {:.1} bins/s", report.bins_per_second);
    }
    info!("FFT window: {} (hop {}, padded {})", report.window_size, report.hop_size, report.padded_size);
    info!("Frequency range: {:.0}-{:.0} Hz", report.displayed_min_freq, report.displayed_max_freq);
    info!(
        "Windows on page: {} of {} ({:.2}s of {:.2}s)",
        report.visible_windows, report.total_windows, report.visible_duration, report.total_duration
    );

    if let Some(path) = &args.report {
        report
            .save(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Report saved to {}", path.display());
    }

    Ok(())
}
