use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use log::{debug, info};
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::{
    BuiltinFont, Color, Greyscale, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference, Point, Pt, Rect,
    TextMatrix,
};

use super::annotation::{self, frequency_label, label_size, octave_ticks};
use super::layout::{AxisScale, CellRect, Device, PageGeometry, MM_PER_INCH, POINTS_PER_INCH};
use super::{paint_cells, write_atomically, Canvas, RenderJob, Renderer, TextOrientation};
use crate::error::{Result, SpectroError};
use crate::settings::{OutputKind, ResolvedSettings};

/// Average Helvetica advance as a fraction of the font size.
const HELVETICA_ADVANCE: f64 = 0.5;
/// Baseline offset from the top of a text box, as a fraction of the size.
const ASCENT: f64 = 0.8;
const GRID_LEVEL: f64 = 0.6;
const GRID_WIDTH_PT: f64 = 0.2;
const LINEAR_GRID_STEPS_HZ: [f64; 2] = [1000.0, 2000.0];
const TITLE_TOP_MM: f64 = 10.0;

fn pt_to_mm(points: f64) -> Mm {
    Mm((points * MM_PER_INCH / POINTS_PER_INCH) as f32)
}

/// One PDF layer addressed in points from the top-left corner.
pub struct PdfCanvas {
    layer: PdfLayerReference,
    font: IndirectFontRef,
    page_height: f64,
    fill: Option<f64>,
    outline: Option<(f64, f64)>,
}

impl PdfCanvas {
    pub fn new(layer: PdfLayerReference, font: IndirectFontRef, page_height: f64) -> Self {
        Self {
            layer,
            font,
            page_height,
            fill: None,
            outline: None,
        }
    }

    fn point(&self, x: f64, y: f64) -> Point {
        Point::new(pt_to_mm(x), pt_to_mm(self.page_height - y))
    }

    fn set_fill(&mut self, level: f64) {
        if self.fill != Some(level) {
            self.layer.set_fill_color(Color::Greyscale(Greyscale::new(level as f32, None)));
            self.fill = Some(level);
        }
    }

    fn set_outline(&mut self, width: f64, level: f64) {
        if self.outline != Some((width, level)) {
            self.layer.set_outline_color(Color::Greyscale(Greyscale::new(level as f32, None)));
            self.layer.set_outline_thickness(width as f32);
            self.outline = Some((width, level));
        }
    }
}

impl Canvas for PdfCanvas {
    fn fill_rect(&mut self, rect: CellRect, level: f64) {
        self.set_fill(level);
        let lower = self.page_height - (rect.y + rect.height);
        let upper = self.page_height - rect.y;
        let shape = Rect::new(
            pt_to_mm(rect.x),
            pt_to_mm(lower),
            pt_to_mm(rect.x + rect.width),
            pt_to_mm(upper),
        )
        .with_mode(PaintMode::Fill)
        .with_winding(WindingOrder::NonZero);
        self.layer.add_rect(shape);
    }

    fn fill_rect_translucent(&mut self, rect: CellRect, level: f64, _alpha: f64) {
        // Painted opaque; the page carries no transparency group.
        self.fill_rect(rect, level);
    }

    fn line(&mut self, from: (f64, f64), to: (f64, f64), width: f64, level: f64) {
        self.set_outline(width, level);
        let line = Line {
            points: vec![(self.point(from.0, from.1), false), (self.point(to.0, to.1), false)],
            is_closed: false,
        };
        self.layer.add_line(line);
    }

    fn text(&mut self, x: f64, y: f64, size: f64, text: &str, orientation: TextOrientation) {
        self.set_fill(0.0);
        match orientation {
            TextOrientation::Horizontal => {
                let baseline = self.page_height - (y + ASCENT * size);
                self.layer.use_text(text, size as f32, pt_to_mm(x), pt_to_mm(baseline), &self.font);
            }
            TextOrientation::Vertical => {
                self.layer.begin_text_section();
                self.layer.set_font(&self.font, size as f32);
                self.layer.set_text_matrix(TextMatrix::TranslateRotate(
                    Pt((x + ASCENT * size) as f32),
                    Pt((self.page_height - y) as f32),
                    90.0,
                ));
                self.layer.write_text(text, &self.font);
                self.layer.end_text_section();
            }
        }
    }

    fn text_extent(&self, text: &str, size: f64) -> (f64, f64) {
        (text.chars().count() as f64 * size * HELVETICA_ADVANCE, size)
    }
}

/// Grid lines across the band: one per octave on a log axis, every 1 kHz
/// (heavier every 2 kHz) on a linear one. Labels sit just inside the band's
/// left edge. Skipped when the vertical scale already labels the axis.
pub fn draw_frequency_grid(canvas: &mut dyn Canvas, geometry: &PageGeometry, settings: &ResolvedSettings) {
    let axis = &geometry.axis;
    let left = geometry.spectro_left;
    let right = geometry.spectro_right();
    let size = label_size(geometry, settings) * 0.75;

    let lines: Vec<(f64, f64)> = match axis.scale {
        AxisScale::Logarithmic => octave_ticks(axis.min_hz, axis.max_hz)
            .into_iter()
            .filter(|&f| f > axis.min_hz)
            .map(|f| (f, GRID_WIDTH_PT))
            .collect(),
        AxisScale::Linear => {
            let step = LINEAR_GRID_STEPS_HZ[0];
            let first = (axis.min_hz / step).floor() as i64 + 1;
            let last = (axis.max_hz / step).floor() as i64;
            (first..=last)
                .map(|k| {
                    let f = k as f64 * step;
                    let heavy = f % LINEAR_GRID_STEPS_HZ[1] == 0.0;
                    (f, if heavy { GRID_WIDTH_PT * 2.0 } else { GRID_WIDTH_PT })
                })
                .collect()
        }
    };

    for &(freq, width) in &lines {
        let y = axis.position(freq);
        canvas.line((left, y), (right, y), width, GRID_LEVEL);
        canvas.text(left + 2.0, y - size * 1.1, size, &frequency_label(freq), TextOrientation::Horizontal);
    }
    debug!("Frequency grid: {} lines", lines.len());
}

/// Title and a one-line summary of the page layout above the band.
pub fn draw_title(canvas: &mut dyn Canvas, job: &RenderJob<'_>) {
    let geometry = job.geometry;
    let size = label_size(geometry, job.settings) * 1.5;
    let x = geometry.mm(TITLE_TOP_MM);
    let y = geometry.mm(TITLE_TOP_MM);
    canvas.text(x, y, size, &format!("Spectrogram: {}", job.metadata.file_name), TextOrientation::Horizontal);

    let summary = format!(
        "{}, {:.1} cm/s, {:.2}s of {:.2}s shown",
        job.settings.page_format.label(),
        job.settings.writing_speed,
        geometry.visible_duration(),
        geometry.total_duration()
    );
    canvas.text(x, y + size * 1.4, size * 0.7, &summary, TextOrientation::Horizontal);
}

/// Single-page PDF at the exact paper size.
pub struct VectorRenderer;

impl Renderer for VectorRenderer {
    fn kind(&self) -> OutputKind {
        OutputKind::Vector
    }

    fn device(&self, settings: &ResolvedSettings) -> Device {
        Device::Vector { printer_dpi: settings.printer_dpi }
    }

    fn render(&self, job: &RenderJob<'_>, output: &Path) -> Result<()> {
        let geometry = job.geometry;
        let title = format!("Spectrogram - {}", job.metadata.file_name);
        let (doc, page, layer) = PdfDocument::new(
            title,
            pt_to_mm(geometry.page_width),
            pt_to_mm(geometry.page_height),
            "Spectrogram",
        );
        let font = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(SpectroError::render)?;
        let mut canvas = PdfCanvas::new(doc.get_page(page).get_layer(layer), font, geometry.page_height);

        let cells = paint_cells(&mut canvas, job.matrix, geometry);
        if !job.settings.vertical_scale {
            draw_frequency_grid(&mut canvas, geometry, job.settings);
        }
        draw_title(&mut canvas, job);
        annotation::annotate(&mut canvas, job);
        drop(canvas);

        info!("Writing PDF ({} cell rectangles) to {}", cells, output.display());
        write_atomically(output, |partial| {
            let file = File::create(partial).map_err(|e| SpectroError::io(partial, e))?;
            doc.save(&mut BufWriter::new(file)).map_err(SpectroError::render)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::tests::{test_geometry, RecordingCanvas};
    use crate::render::layout::FrequencyAxis;

    #[test]
    fn test_log_grid_follows_octaves() {
        let geometry = test_geometry(10);
        let mut canvas = RecordingCanvas::default();
        draw_frequency_grid(&mut canvas, &geometry, &ResolvedSettings::default());
        // 10..80 Hz: 16, 32, 64
        assert_eq!(canvas.lines.len(), 3);
        assert_eq!(canvas.texts[0].2, "16 Hz");
    }

    #[test]
    fn test_linear_grid_every_kilohertz() {
        let mut geometry = test_geometry(10);
        geometry.axis = FrequencyAxis { min_hz: 0.0, max_hz: 4500.0, scale: AxisScale::Linear, ..geometry.axis };
        let mut canvas = RecordingCanvas::default();
        draw_frequency_grid(&mut canvas, &geometry, &ResolvedSettings::default());
        assert_eq!(canvas.lines.len(), 4);
        // 2 kHz and 4 kHz lines are heavier
        assert_eq!(canvas.lines[1].2, GRID_WIDTH_PT * 2.0);
        assert_eq!(canvas.lines[0].2, GRID_WIDTH_PT);
    }
}
