use log::debug;

use super::layout::{CellRect, PageGeometry};
use super::{Canvas, PageMetadata, RenderJob, TextOrientation};
use crate::settings::ResolvedSettings;

/// Label text height per unit of text scale.
pub const TEXT_MM_PER_SCALE: f64 = 1.4;
/// Line width per unit of line scale.
pub const LINE_MM_PER_SCALE: f64 = 0.1;
pub const TICK_MM: f64 = 2.0;
/// The parameter block is set larger than the scale labels.
pub const PARAMETER_TEXT_FACTOR: f64 = 1.5;
pub const BACKGROUND_ALPHA: f64 = 0.85;

const LABEL_GAP_MM: f64 = 1.0;
const TEXT_PADDING_MM: f64 = 1.5;
const PARAMETER_MARGIN_MM: f64 = 5.0;
const LINE_SPACING: f64 = 1.3;

/// Frequencies that get a tick: every octave `2^k` inside the range, plus
/// the lower bound itself when it is not an octave.
pub fn octave_ticks(min_hz: f64, max_hz: f64) -> Vec<f64> {
    let mut ticks = Vec::new();
    if !(min_hz > 0.0 && max_hz > min_hz) {
        return ticks;
    }
    let first = min_hz.log2().ceil() as i32;
    let last = max_hz.log2().floor() as i32;
    if min_hz.log2().fract() != 0.0 {
        ticks.push(min_hz);
    }
    ticks.extend((first..=last).map(|k| 2f64.powi(k)));
    ticks
}

/// `"1.0 kHz"` style above 1 kHz, whole hertz below.
pub fn frequency_label(freq_hz: f64) -> String {
    if freq_hz >= 1000.0 {
        format!("{:.1} kHz", freq_hz / 1000.0)
    } else {
        format!("{:.0} Hz", freq_hz)
    }
}

/// The two lines of the parameter block.
pub fn parameter_lines(metadata: &PageMetadata, settings: &ResolvedSettings, displayed: (f64, f64)) -> [String; 2] {
    let high_pass = if settings.high_pass {
        format!("On ({:.0} Hz, order {})", settings.high_pass_cutoff, settings.high_pass_order)
    } else {
        "Off".to_string()
    };
    let boost = if settings.pre_emphasis {
        format!("On ({:.2})", settings.pre_emphasis_alpha)
    } else {
        "Off".to_string()
    };

    [
        format!(
            "File: {}, Start: {:.2}s, Duration: {:.2}s, Bins/s: {:.1}, Overlap: {}, FFT: {}",
            metadata.file_name,
            metadata.start_time,
            metadata.duration,
            metadata.bins_per_second,
            settings.overlap_preset,
            metadata.window_size
        ),
        format!(
            "Freq: {:.0}-{:.0} Hz, SR: {} Hz, HPF: {}, DR: {:.1} dB, Gamma: {:.1}, Contrast: {:.1}, HB: {}, WS: {:.1} cm/s",
            displayed.0,
            displayed.1,
            metadata.sample_rate,
            high_pass,
            settings.dynamic_range_db,
            settings.gamma,
            settings.contrast,
            boost,
            settings.writing_speed
        ),
    ]
}

pub fn line_width(geometry: &PageGeometry, settings: &ResolvedSettings) -> f64 {
    geometry.mm(LINE_MM_PER_SCALE * settings.line_scale)
}

pub fn label_size(geometry: &PageGeometry, settings: &ResolvedSettings) -> f64 {
    geometry.mm(TEXT_MM_PER_SCALE * settings.text_scale)
}

/// Axis line on the band's left edge with a tick and rotated label per octave.
pub fn draw_vertical_scale(canvas: &mut dyn Canvas, geometry: &PageGeometry, settings: &ResolvedSettings) {
    let axis = &geometry.axis;
    let width = line_width(geometry, settings);
    let size = label_size(geometry, settings);
    let tick = geometry.mm(TICK_MM);
    let left = geometry.spectro_left;

    canvas.line((left, geometry.spectro_top), (left, geometry.spectro_bottom()), width, 0.0);

    let ticks = octave_ticks(axis.min_hz, axis.max_hz);
    for &freq in &ticks {
        let y = axis.position(freq);
        canvas.line((left - tick, y), (left, y), width, 0.0);

        let label = frequency_label(freq);
        let (text_width, text_height) = canvas.text_extent(&label, size);
        let x = (left - tick - geometry.mm(LABEL_GAP_MM) - text_height).max(0.0);
        let baseline = (y + text_width / 2.0).max(text_width).min(geometry.page_height);
        canvas.text(x, baseline, size, &label, TextOrientation::Vertical);
    }
    debug!("Vertical scale: {} ticks", ticks.len());
}

/// Horizontal guide lines above and below the band, as enabled.
pub fn draw_reference_lines(canvas: &mut dyn Canvas, geometry: &PageGeometry, settings: &ResolvedSettings) {
    let width = line_width(geometry, settings);
    let left = geometry.spectro_left;
    let right = geometry.spectro_right();

    if settings.top_reference_line {
        let y = geometry.spectro_top - geometry.mm(settings.top_reference_offset_mm);
        canvas.line((left, y), (right, y), width, 0.0);
    }
    if settings.bottom_reference_line {
        let y = geometry.spectro_bottom() + geometry.mm(settings.bottom_reference_offset_mm);
        canvas.line((left, y), (right, y), width, 0.0);
    }
}

/// Two-line summary of the generation parameters near the page bottom, on a
/// mostly opaque white box.
pub fn draw_parameter_text(
    canvas: &mut dyn Canvas,
    geometry: &PageGeometry,
    settings: &ResolvedSettings,
    metadata: &PageMetadata,
) {
    let size = label_size(geometry, settings) * PARAMETER_TEXT_FACTOR;
    let padding = geometry.mm(TEXT_PADDING_MM);
    let lines = parameter_lines(metadata, settings, (geometry.axis.min_hz, geometry.axis.max_hz));

    let extents: Vec<(f64, f64)> = lines.iter().map(|line| canvas.text_extent(line, size)).collect();
    let text_width = extents.iter().fold(0.0f64, |acc, &(w, _)| acc.max(w));
    let line_height = extents.iter().fold(0.0f64, |acc, &(_, h)| acc.max(h)) * LINE_SPACING;
    let block_height = line_height * lines.len() as f64 + 2.0 * padding;

    let x = geometry.mm(PARAMETER_MARGIN_MM);
    let y = (geometry.page_height - geometry.mm(PARAMETER_MARGIN_MM) - block_height).max(0.0);
    let background = CellRect {
        x: x - padding,
        y,
        width: text_width + 2.0 * padding,
        height: block_height,
    };
    canvas.fill_rect_translucent(background, 1.0, BACKGROUND_ALPHA);

    for (index, line) in lines.iter().enumerate() {
        let line_top = y + padding + index as f64 * line_height;
        canvas.text(x, line_top, size, line, TextOrientation::Horizontal);
    }
}

/// Everything the settings switch on, drawn over the cells.
pub fn annotate(canvas: &mut dyn Canvas, job: &RenderJob<'_>) {
    if job.settings.vertical_scale {
        draw_vertical_scale(canvas, job.geometry, job.settings);
    }
    draw_reference_lines(canvas, job.geometry, job.settings);
    if job.settings.parameter_text {
        draw_parameter_text(canvas, job.geometry, job.settings, job.metadata);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::tests::{test_geometry, RecordingCanvas};
    use crate::settings::OverlapPreset;

    fn metadata() -> PageMetadata {
        PageMetadata {
            file_name: "take1.wav".to_string(),
            start_time: 1.5,
            duration: 8.4,
            sample_rate: 48000,
            bins_per_second: 150.0,
            window_size: 1024,
        }
    }

    #[test]
    fn test_octave_ticks_include_lower_bound() {
        let ticks = octave_ticks(65.0, 16640.0);
        assert_eq!(ticks[0], 65.0);
        assert_eq!(&ticks[1..], &[128.0, 256.0, 512.0, 1024.0, 2048.0, 4096.0, 8192.0, 16384.0]);

        // Exact octave bounds are not duplicated
        assert_eq!(octave_ticks(64.0, 256.0), vec![64.0, 128.0, 256.0]);
        assert!(octave_ticks(100.0, 100.0).is_empty());
    }

    #[test]
    fn test_frequency_labels() {
        assert_eq!(frequency_label(65.0), "65 Hz");
        assert_eq!(frequency_label(512.0), "512 Hz");
        assert_eq!(frequency_label(1024.0), "1.0 kHz");
        assert_eq!(frequency_label(16384.0), "16.4 kHz");
    }

    #[test]
    fn test_parameter_lines() {
        let settings = ResolvedSettings { overlap_preset: OverlapPreset::High, ..Default::default() };
        let [first, second] = parameter_lines(&metadata(), &settings, (65.0, 16640.0));
        assert_eq!(
            first,
            "File: take1.wav, Start: 1.50s, Duration: 8.40s, Bins/s: 150.0, Overlap: High, FFT: 1024"
        );
        assert!(second.starts_with("Freq: 65-16640 Hz, SR: 48000 Hz, HPF: Off, DR: 60.0 dB"));
        assert!(second.contains("HB: On (0.99)"));
        assert!(second.ends_with("WS: 2.5 cm/s"));
    }

    #[test]
    fn test_reference_lines_sit_outside_the_band() {
        let geometry = test_geometry(10);
        let settings = ResolvedSettings {
            top_reference_line: true,
            bottom_reference_line: true,
            ..Default::default()
        };
        let mut canvas = RecordingCanvas::default();
        draw_reference_lines(&mut canvas, &geometry, &settings);

        assert_eq!(canvas.lines.len(), 2);
        let (top_from, top_to, _) = canvas.lines[0];
        assert!((geometry.spectro_top - top_from.1 - geometry.mm(12.55)).abs() < 1e-9);
        assert_eq!(top_to.0, geometry.spectro_right());
        let (bottom_from, _, _) = canvas.lines[1];
        assert!((bottom_from.1 - geometry.spectro_bottom() - geometry.mm(34.75)).abs() < 1e-9);
    }

    #[test]
    fn test_vertical_scale_draws_a_tick_per_octave() {
        let geometry = test_geometry(10);
        let settings = ResolvedSettings::default();
        let mut canvas = RecordingCanvas::default();
        draw_vertical_scale(&mut canvas, &geometry, &settings);

        let ticks = octave_ticks(geometry.axis.min_hz, geometry.axis.max_hz);
        assert_eq!(canvas.lines.len(), ticks.len() + 1);
        assert_eq!(canvas.texts.len(), ticks.len());
        assert!(canvas.texts.iter().all(|t| t.3 == TextOrientation::Vertical));
    }

    #[test]
    fn test_parameter_block_has_background_and_two_lines() {
        let geometry = test_geometry(10);
        let settings = ResolvedSettings::default();
        let mut canvas = RecordingCanvas::default();
        draw_parameter_text(&mut canvas, &geometry, &settings, &metadata());

        assert_eq!(canvas.translucent.len(), 1);
        assert_eq!(canvas.translucent[0].2, BACKGROUND_ALPHA);
        assert_eq!(canvas.texts.len(), 2);
        let block = canvas.translucent[0].0;
        assert!(block.y + block.height <= geometry.page_height);
    }
}
