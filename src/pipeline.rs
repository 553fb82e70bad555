use std::path::Path;

use image::GrayImage;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::analysis::{
    apply_tone_mapping, bins_per_second_from_slider, clamp_bins_per_second, plan_transform, ClampedResolution,
    FrequencyRange, SpectrogramMatrix, StftEngine, ToneParams, TransformPlan,
};
use crate::audio::{high_pass, load_wav, pre_emphasis, read_wav_info, LoadOptions};
use crate::error::{Result, SpectroError};
use crate::render::layout::{page_seconds, Device, PageGeometry};
use crate::render::raster::render_page;
use crate::render::{renderer_for, PageMetadata, RenderJob};
use crate::settings::{GenerationSettings, OutputKind, PageFormat, ResolvedSettings};

/// Coarse progress points reported during a generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    /// Settings resolved, audio loading and conditioning
    Prepare,
    /// Transform and tone mapping
    Compute,
    /// Layout and output
    Finalize,
}

/// What a generation call produced, for logs and the `--report` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub input: String,
    pub output: Option<String>,
    pub kind: OutputKind,

    pub sample_rate: u32,
    pub start_time: f64,
    pub loaded_duration: f64,
    pub source_duration: f64,

    pub requested_bins_per_second: f64,
    pub bins_per_second: f64,
    pub resolution_limited: bool,
    pub window_size: usize,
    pub hop_size: usize,
    pub padded_size: usize,
    pub overlap_ratio: f64,

    pub range_reset: bool,
    pub displayed_min_freq: f64,
    pub displayed_max_freq: f64,

    pub total_windows: usize,
    pub visible_windows: usize,
    pub visible_duration: f64,
    pub total_duration: f64,

    pub page_format: PageFormat,
    /// Page size in device units (pixels or points)
    pub page_width: f64,
    pub page_height: f64,
}

impl GenerationReport {
    /// Save as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Tone-mapped analysis of one input, ready to lay out.
struct Analysis {
    matrix: SpectrogramMatrix,
    plan: TransformPlan,
    resolution: ClampedResolution,
    requested_bins_per_second: f64,
    metadata: PageMetadata,
    source_duration: f64,
}

/// Seconds to load when no duration is given: what the band can hold plus
/// one window and one hop, so the last visible window is complete.
fn printable_duration(settings: &ResolvedSettings, device: Device, plan: &TransformPlan, sample_rate: u32) -> f64 {
    page_seconds(settings, device) + (plan.window_size + plan.hop_size) as f64 / sample_rate as f64
}

fn analyze(
    input: &Path,
    settings: &ResolvedSettings,
    device: Device,
    progress: &mut dyn FnMut(Milestone),
) -> Result<Analysis> {
    progress(Milestone::Prepare);

    let (requested_bins_per_second, resolution) = match settings.resolution_slider {
        Some(slider) => {
            let mapped = bins_per_second_from_slider(slider, settings.writing_speed, settings.printer_dpi);
            (mapped.bins_per_second, mapped)
        }
        None => (
            settings.bins_per_second,
            clamp_bins_per_second(settings.bins_per_second, settings.writing_speed, settings.printer_dpi),
        ),
    };

    let header = read_wav_info(input)?;
    let plan =
        plan_transform(header.sample_rate, resolution.bins_per_second, settings.overlap_preset, settings.fft_size);
    info!(
        "Plan: {:.1} bins/s, window {}, hop {}, padded {}",
        resolution.bins_per_second, plan.window_size, plan.hop_size, plan.padded_size
    );

    let duration = if settings.duration > 0.0 {
        settings.duration
    } else {
        let printable = printable_duration(settings, device, &plan, header.sample_rate);
        debug!("No duration given; loading the {:.2}s the page can hold", printable);
        printable
    };
    let options = LoadOptions {
        start_time: settings.start_time,
        duration,
        normalize: settings.normalize,
    };
    let signal = load_wav(input, &options)?;
    info!(
        "Loaded {:.2}s at {} Hz (offset {:.2}s of {:.2}s)",
        signal.duration_seconds(),
        signal.sample_rate,
        signal.start_offset_s,
        signal.source_duration_s
    );

    let sample_rate = signal.sample_rate;
    let mut samples = signal.samples;
    if settings.high_pass {
        samples = high_pass(samples, settings.high_pass_cutoff, sample_rate, settings.high_pass_order);
    }
    if settings.pre_emphasis {
        samples = pre_emphasis(samples, settings.pre_emphasis_alpha);
    }

    progress(Milestone::Compute);
    let mut engine = StftEngine::new(plan)?;
    let mut matrix = engine.compute(
        &samples,
        sample_rate,
        FrequencyRange::new(settings.min_freq, settings.max_freq),
    )?;
    drop(engine);
    let loaded_duration = samples.len() as f64 / sample_rate as f64;
    drop(samples);

    apply_tone_mapping(&mut matrix, ToneParams::from_settings(settings));

    let metadata = PageMetadata {
        file_name: input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        start_time: signal.start_offset_s,
        duration: loaded_duration,
        sample_rate,
        bins_per_second: plan.effective_bins_per_second(sample_rate),
        window_size: plan.window_size,
    };

    Ok(Analysis {
        matrix,
        plan,
        resolution,
        requested_bins_per_second,
        metadata,
        source_duration: signal.source_duration_s,
    })
}

fn layout(analysis: &Analysis, settings: &ResolvedSettings, device: Device) -> PageGeometry {
    PageGeometry::compute(
        settings,
        device,
        analysis.matrix.num_windows(),
        analysis.metadata.bins_per_second,
        analysis.matrix.display_range(),
    )
}

fn report(
    input: &Path,
    output: Option<&Path>,
    kind: OutputKind,
    analysis: &Analysis,
    geometry: &PageGeometry,
    settings: &ResolvedSettings,
) -> GenerationReport {
    let (displayed_min_freq, displayed_max_freq) = analysis.matrix.display_range();
    GenerationReport {
        input: input.display().to_string(),
        output: output.map(|p| p.display().to_string()),
        kind,
        sample_rate: analysis.metadata.sample_rate,
        start_time: analysis.metadata.start_time,
        loaded_duration: analysis.metadata.duration,
        source_duration: analysis.source_duration,
        requested_bins_per_second: analysis.requested_bins_per_second,
        bins_per_second: analysis.resolution.bins_per_second,
        resolution_limited: analysis.resolution.resolution_limited,
        window_size: analysis.plan.window_size,
        hop_size: analysis.plan.hop_size,
        padded_size: analysis.plan.padded_size,
        overlap_ratio: analysis.plan.overlap_ratio,
        range_reset: analysis.matrix.range_reset(),
        displayed_min_freq,
        displayed_max_freq,
        total_windows: geometry.total_window_count,
        visible_windows: geometry.visible_window_count,
        visible_duration: geometry.visible_duration(),
        total_duration: geometry.total_duration(),
        page_format: settings.page_format,
        page_width: geometry.page_width,
        page_height: geometry.page_height,
    }
}

/// Turn a WAV file into a printable spectrogram page.
///
/// The output format is `kind` if given, otherwise taken from the output
/// extension (`.png` or `.pdf`). Fails before touching the input when neither
/// names a known format. On error no output file is left behind.
pub fn generate(
    input: &Path,
    output: &Path,
    settings: &GenerationSettings,
    kind: Option<OutputKind>,
    progress: &mut dyn FnMut(Milestone),
) -> Result<GenerationReport> {
    let kind = kind
        .or_else(|| OutputKind::from_path(output))
        .ok_or_else(|| SpectroError::render(format!("cannot tell output format of {}", output.display())))?;
    let renderer = renderer_for(kind);
    let settings = settings.resolve();
    let device = renderer.device(&settings);

    let analysis = analyze(input, &settings, device, progress)?;
    let geometry = layout(&analysis, &settings, device);

    progress(Milestone::Finalize);
    let job = RenderJob {
        matrix: &analysis.matrix,
        geometry: &geometry,
        settings: &settings,
        metadata: &analysis.metadata,
    };
    renderer.render(&job, output)?;

    let report = report(input, Some(output), kind, &analysis, &geometry, &settings);
    info!(
        "Wrote {} ({} of {} windows, {:.2}s shown)",
        output.display(),
        report.visible_windows,
        report.total_windows,
        report.visible_duration
    );
    Ok(report)
}

/// Render the raster page in memory without writing a file.
pub fn generate_preview(
    input: &Path,
    settings: &GenerationSettings,
    progress: &mut dyn FnMut(Milestone),
) -> Result<(GrayImage, GenerationReport)> {
    let settings = settings.resolve();
    let device = Device::Raster { dpi: settings.printer_dpi };
    let analysis = analyze(input, &settings, device, progress)?;
    let geometry = layout(&analysis, &settings, device);

    progress(Milestone::Finalize);
    let job = RenderJob {
        matrix: &analysis.matrix,
        geometry: &geometry,
        settings: &settings,
        metadata: &analysis.metadata,
    };
    let image = render_page(&job);
    let report = report(input, None, OutputKind::Raster, &analysis, &geometry, &settings);
    Ok((image, report))
}
