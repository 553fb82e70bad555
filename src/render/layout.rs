use log::{info, warn};
use serde::Serialize;

use crate::settings::{PageFormat, ResolvedSettings};

pub const MM_PER_INCH: f64 = 25.4;
pub const POINTS_PER_INCH: f64 = 72.0;

/// Room left of the band for the rotated octave labels.
pub const SCALE_MARGIN_MM: f64 = 15.0;

/// Target surface for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    /// Pixels at `dpi`
    Raster { dpi: u32 },
    /// PostScript points; `printer_dpi` sets the smallest cell drawn
    Vector { printer_dpi: u32 },
}

impl Device {
    pub fn units_per_mm(self) -> f64 {
        match self {
            Device::Raster { dpi } => dpi as f64 / MM_PER_INCH,
            Device::Vector { .. } => POINTS_PER_INCH / MM_PER_INCH,
        }
    }

    /// One printer dot in device units.
    pub fn min_cell_height(self) -> f64 {
        match self {
            Device::Raster { .. } => 1.0,
            Device::Vector { printer_dpi } => POINTS_PER_INCH / printer_dpi.max(1) as f64,
        }
    }

    /// Page (width, height) in device units. Raster sizes are whole pixels.
    pub fn page_size(self, format: PageFormat) -> (f64, f64) {
        let (width_mm, height_mm) = format.size_mm();
        let scale = self.units_per_mm();
        match self {
            Device::Raster { .. } => ((width_mm * scale).round(), (height_mm * scale).round()),
            Device::Vector { .. } => (width_mm * scale, height_mm * scale),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AxisScale {
    Logarithmic,
    Linear,
}

/// Maps frequencies onto vertical positions inside the band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyAxis {
    pub min_hz: f64,
    pub max_hz: f64,
    pub scale: AxisScale,
    /// Device y of the band's bottom edge (y grows downward)
    pub bottom: f64,
    pub height: f64,
}

impl FrequencyAxis {
    /// Fraction of the band height at which `freq_hz` sits, clamped to [0, 1].
    pub fn ratio(&self, freq_hz: f64) -> f64 {
        let ratio = match self.scale {
            AxisScale::Logarithmic => {
                if freq_hz <= 0.0 || self.min_hz <= 0.0 || self.max_hz <= self.min_hz {
                    return 0.0;
                }
                (freq_hz / self.min_hz).log2() / (self.max_hz / self.min_hz).log2()
            }
            AxisScale::Linear => {
                if self.max_hz <= self.min_hz {
                    return 0.0;
                }
                (freq_hz - self.min_hz) / (self.max_hz - self.min_hz)
            }
        };
        ratio.clamp(0.0, 1.0)
    }

    pub fn position(&self, freq_hz: f64) -> f64 {
        self.bottom - self.ratio(freq_hz) * self.height
    }
}

fn left_margin(settings: &ResolvedSettings, device: Device) -> f64 {
    if settings.vertical_scale {
        SCALE_MARGIN_MM * device.units_per_mm()
    } else {
        0.0
    }
}

/// Width of the spectrogram band in device units.
pub fn band_width(settings: &ResolvedSettings, device: Device) -> f64 {
    let (page_width, _) = device.page_size(settings.page_format);
    (page_width - left_margin(settings, device)).max(0.0)
}

/// Seconds of audio the band holds at the configured writing speed.
pub fn page_seconds(settings: &ResolvedSettings, device: Device) -> f64 {
    if settings.writing_speed <= 0.0 {
        return 0.0;
    }
    let band_cm = band_width(settings, device) / device.units_per_mm() / 10.0;
    band_cm / settings.writing_speed
}

/// A rectangle in device units, origin at the top-left of the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Where everything goes on the page, in device units.
///
/// # Architecture Role
/// Computed once per render from the settings and the analysis result, then
/// shared read-only by the cell painter, the annotation layer and both
/// renderers so raster and vector output line up to the same millimetre.
#[derive(Debug, Clone, PartialEq)]
pub struct PageGeometry {
    pub page_width: f64,
    pub page_height: f64,
    pub margin: f64,
    pub spectro_left: f64,
    pub spectro_top: f64,
    pub spectro_width: f64,
    pub spectro_height: f64,
    /// Physical width of one analysis window
    pub window_width: f64,
    pub visible_window_count: usize,
    pub total_window_count: usize,
    pub windows_per_second: f64,
    pub units_per_mm: f64,
    pub min_cell_height: f64,
    pub axis: FrequencyAxis,
}

impl PageGeometry {
    /// Lay out a page for `total_windows` analysis windows spaced
    /// `1 / windows_per_second` seconds apart.
    ///
    /// Each window gets `writing_speed / windows_per_second` cm of width.
    /// Windows that do not fit the band are dropped from the right; nothing
    /// is rescaled.
    pub fn compute(
        settings: &ResolvedSettings,
        device: Device,
        total_windows: usize,
        windows_per_second: f64,
        display_range: (f64, f64),
    ) -> Self {
        let units_per_mm = device.units_per_mm();
        let (page_width, page_height) = device.page_size(settings.page_format);
        let page_height_mm = page_height / units_per_mm;

        let margin = left_margin(settings, device);
        let bottom_mm = settings.bottom_margin_mm.min(page_height_mm);
        let height_mm = settings.spectro_height_mm.min(page_height_mm - bottom_mm);
        if height_mm < settings.spectro_height_mm {
            warn!(
                "Spectrogram height {:.1} mm does not fit above a {:.1} mm margin; using {:.1} mm",
                settings.spectro_height_mm, bottom_mm, height_mm
            );
        }

        let spectro_left = margin;
        let spectro_width = band_width(settings, device);
        let spectro_height = height_mm * units_per_mm;
        let spectro_bottom = page_height - bottom_mm * units_per_mm;
        let spectro_top = spectro_bottom - spectro_height;

        let window_width = settings.writing_speed * 10.0 / windows_per_second * units_per_mm;
        let fitting = if window_width > 0.0 {
            (spectro_width / window_width + 1e-9).floor() as usize
        } else {
            0
        };
        let visible_window_count = total_windows.min(fitting);
        if visible_window_count < total_windows {
            info!(
                "Page holds {} of {} windows ({:.2}s of {:.2}s); truncating",
                visible_window_count,
                total_windows,
                visible_window_count as f64 / windows_per_second,
                total_windows as f64 / windows_per_second
            );
        }
        if visible_window_count == 0 && total_windows > 0 {
            warn!("A single window is wider than the page; nothing will be drawn");
        }

        let axis = FrequencyAxis {
            min_hz: display_range.0,
            max_hz: display_range.1,
            scale: if settings.log_frequency { AxisScale::Logarithmic } else { AxisScale::Linear },
            bottom: spectro_bottom,
            height: spectro_height,
        };

        Self {
            page_width,
            page_height,
            margin,
            spectro_left,
            spectro_top,
            spectro_width,
            spectro_height,
            window_width,
            visible_window_count,
            total_window_count: total_windows,
            windows_per_second,
            units_per_mm,
            min_cell_height: device.min_cell_height(),
            axis,
        }
    }

    pub fn spectro_bottom(&self) -> f64 {
        self.spectro_top + self.spectro_height
    }

    pub fn spectro_right(&self) -> f64 {
        self.spectro_left + self.spectro_width
    }

    pub fn mm(&self, millimetres: f64) -> f64 {
        millimetres * self.units_per_mm
    }

    pub fn window_x(&self, window: usize) -> f64 {
        self.spectro_left + window as f64 * self.window_width
    }

    /// Seconds of audio that made it onto the page.
    pub fn visible_duration(&self) -> f64 {
        self.visible_window_count as f64 / self.windows_per_second
    }

    pub fn total_duration(&self) -> f64 {
        self.total_window_count as f64 / self.windows_per_second
    }

    /// Vertical extent of a bin spanning `freq_hz..next_freq_hz` as
    /// `(top, bottom)`, never thinner than one printer dot and never outside
    /// the band.
    pub fn cell_span(&self, freq_hz: f64, next_freq_hz: f64) -> (f64, f64) {
        let bottom = self.axis.position(freq_hz);
        let next = self.axis.position(next_freq_hz);
        let height = (bottom - next).abs().max(self.min_cell_height);
        let top = (bottom - height).max(self.spectro_top);
        (top, (top + height).min(self.spectro_bottom()))
    }
}
