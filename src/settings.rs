use std::fmt;
use std::path::Path;

use anyhow::Result;
use clap::ValueEnum;
use log::{debug, warn};
use serde::{Deserialize, Deserializer, Serialize};

/// Lowest analysis density accepted after clamping (windows per second).
pub const MIN_BINS_PER_SECOND: f64 = 20.0;

pub const DEFAULT_BINS_PER_SECOND: f64 = 150.0;
pub const DEFAULT_MIN_FREQ: f64 = 65.0;
pub const DEFAULT_MAX_FREQ: f64 = 16640.0;
pub const DEFAULT_DYNAMIC_RANGE_DB: f64 = 60.0;
pub const DEFAULT_GAMMA: f64 = 0.8;
pub const DEFAULT_CONTRAST: f64 = 1.9;
pub const DEFAULT_PRE_EMPHASIS_ALPHA: f64 = 0.99;
pub const DEFAULT_HIGH_PASS_CUTOFF: f64 = 20.0;
pub const DEFAULT_HIGH_PASS_ORDER: u32 = 2;
pub const DEFAULT_BOTTOM_MARGIN_MM: f64 = 50.8;
pub const DEFAULT_SPECTRO_HEIGHT_MM: f64 = 169.3;
pub const DEFAULT_WRITING_SPEED: f64 = 2.5;
pub const DEFAULT_PRINTER_DPI: u32 = 800;
pub const DEFAULT_TOP_REFERENCE_OFFSET_MM: f64 = 12.55;
pub const DEFAULT_BOTTOM_REFERENCE_OFFSET_MM: f64 = 34.75;
pub const DEFAULT_TEXT_SCALE: f64 = 2.0;
pub const DEFAULT_LINE_SCALE: f64 = 2.0;

/// Paper formats the layout engine knows how to size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PageFormat {
    /// 210 x 297 mm, portrait
    #[default]
    A4Portrait,
    /// 420 x 297 mm, landscape
    A3Landscape,
}

impl PageFormat {
    /// Physical page size as (width, height) in millimetres.
    pub fn size_mm(self) -> (f64, f64) {
        match self {
            PageFormat::A4Portrait => (210.0, 297.0),
            PageFormat::A3Landscape => (420.0, 297.0),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PageFormat::A4Portrait => "A4 portrait",
            PageFormat::A3Landscape => "A3 landscape",
        }
    }
}

/// Three-tier choice of how much consecutive analysis windows overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPreset {
    Low,
    #[default]
    Medium,
    High,
}

impl OverlapPreset {
    /// Fraction of each window shared with the next one.
    pub fn ratio(self) -> f64 {
        match self {
            OverlapPreset::Low => 0.30,
            OverlapPreset::Medium => 0.60,
            OverlapPreset::High => 0.85,
        }
    }
}

impl fmt::Display for OverlapPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OverlapPreset::Low => "Low",
            OverlapPreset::Medium => "Medium",
            OverlapPreset::High => "High",
        };
        write!(f, "{}", name)
    }
}

/// Output strategy for a generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Grayscale PNG at the printer DPI
    Raster,
    /// Single-page PDF with exact physical dimensions
    Vector,
}

impl OutputKind {
    /// Pick the output strategy from a file extension (`png` or `pdf`).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(OutputKind::Raster),
            "pdf" => Some(OutputKind::Vector),
            _ => None,
        }
    }
}

/// User-facing generation parameters.
///
/// Every field is optional. Numeric fields left at zero (or set negative) and
/// flags left unset fall back to their defaults in [`GenerationSettings::resolve`],
/// so a caller can supply only the fields it cares about. Settings files are
/// plain JSON with the same field names; flags also accept `0`/`1`.
///
/// # Architecture Role
/// This is the only input the pipeline takes besides the file paths. The CLI
/// loads it from JSON, applies command line overrides, and hands it over;
/// everything downstream works from the [`ResolvedSettings`] it produces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub fft_size: i64,
    pub bins_per_second: f64,
    /// 0.0 (finest) to 1.0 (coarsest); overrides `bins_per_second` when set
    pub resolution_slider: Option<f64>,
    pub overlap_preset: Option<OverlapPreset>,

    pub min_freq: f64,
    pub max_freq: f64,
    pub dynamic_range_db: f64,
    pub gamma: f64,
    #[serde(deserialize_with = "lenient_flag")]
    pub dithering: Option<bool>,
    pub dither_seed: Option<u64>,
    pub contrast: f64,
    #[serde(deserialize_with = "lenient_flag")]
    pub log_amplitude: Option<bool>,
    #[serde(deserialize_with = "lenient_flag")]
    pub log_frequency: Option<bool>,

    #[serde(deserialize_with = "lenient_flag")]
    pub pre_emphasis: Option<bool>,
    pub pre_emphasis_alpha: f64,
    #[serde(deserialize_with = "lenient_flag")]
    pub high_pass: Option<bool>,
    pub high_pass_cutoff: f64,
    pub high_pass_order: i64,
    #[serde(deserialize_with = "lenient_flag")]
    pub normalize: Option<bool>,

    pub page_format: Option<PageFormat>,
    pub bottom_margin_mm: f64,
    pub spectro_height_mm: f64,
    pub writing_speed: f64,
    pub printer_dpi: i64,
    pub blur_radius: i64,

    /// Segment start within the file, in seconds
    pub start_time: f64,
    /// Segment length in seconds; 0 loads what the page can hold
    pub duration: f64,

    #[serde(deserialize_with = "lenient_flag")]
    pub vertical_scale: Option<bool>,
    #[serde(deserialize_with = "lenient_flag")]
    pub top_reference_line: Option<bool>,
    pub top_reference_offset_mm: f64,
    #[serde(deserialize_with = "lenient_flag")]
    pub bottom_reference_line: Option<bool>,
    pub bottom_reference_offset_mm: f64,
    #[serde(deserialize_with = "lenient_flag")]
    pub parameter_text: Option<bool>,
    pub text_scale: f64,
    pub line_scale: f64,
}

/// Settings with every default applied. Produced once per generation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedSettings {
    pub fft_size: Option<usize>,
    pub bins_per_second: f64,
    pub resolution_slider: Option<f64>,
    pub overlap_preset: OverlapPreset,

    pub min_freq: f64,
    pub max_freq: f64,
    pub dynamic_range_db: f64,
    pub gamma: f64,
    pub dithering: bool,
    pub dither_seed: Option<u64>,
    pub contrast: f64,
    pub log_amplitude: bool,
    pub log_frequency: bool,

    pub pre_emphasis: bool,
    pub pre_emphasis_alpha: f64,
    pub high_pass: bool,
    pub high_pass_cutoff: f64,
    pub high_pass_order: u32,
    pub normalize: bool,

    pub page_format: PageFormat,
    pub bottom_margin_mm: f64,
    pub spectro_height_mm: f64,
    pub writing_speed: f64,
    pub printer_dpi: u32,
    pub blur_radius: u32,

    pub start_time: f64,
    pub duration: f64,

    pub vertical_scale: bool,
    pub top_reference_line: bool,
    pub top_reference_offset_mm: f64,
    pub bottom_reference_line: bool,
    pub bottom_reference_offset_mm: f64,
    pub parameter_text: bool,
    pub text_scale: f64,
    pub line_scale: f64,
}

impl Default for ResolvedSettings {
    fn default() -> Self {
        GenerationSettings::default().resolve()
    }
}

impl GenerationSettings {
    /// Apply defaults to every unset or out-of-range field.
    pub fn resolve(&self) -> ResolvedSettings {
        let resolved = ResolvedSettings {
            fft_size: Some(positive_int_or(self.fft_size, 0) as usize).filter(|&size| size > 0),
            bins_per_second: positive_or(self.bins_per_second, DEFAULT_BINS_PER_SECOND),
            resolution_slider: self.resolution_slider.filter(|s| s.is_finite()).map(|s| s.clamp(0.0, 1.0)),
            overlap_preset: self.overlap_preset.unwrap_or_default(),

            min_freq: positive_or(self.min_freq, DEFAULT_MIN_FREQ),
            max_freq: positive_or(self.max_freq, DEFAULT_MAX_FREQ),
            dynamic_range_db: positive_or(self.dynamic_range_db, DEFAULT_DYNAMIC_RANGE_DB),
            gamma: positive_or(self.gamma, DEFAULT_GAMMA),
            dithering: self.dithering.unwrap_or(false),
            dither_seed: self.dither_seed,
            contrast: positive_or(self.contrast, DEFAULT_CONTRAST),
            log_amplitude: self.log_amplitude.unwrap_or(true),
            log_frequency: self.log_frequency.unwrap_or(true),

            pre_emphasis: self.pre_emphasis.unwrap_or(true),
            pre_emphasis_alpha: positive_or(self.pre_emphasis_alpha, DEFAULT_PRE_EMPHASIS_ALPHA),
            high_pass: self.high_pass.unwrap_or(false),
            high_pass_cutoff: positive_or(self.high_pass_cutoff, DEFAULT_HIGH_PASS_CUTOFF),
            high_pass_order: positive_int_or(self.high_pass_order, DEFAULT_HIGH_PASS_ORDER),
            normalize: self.normalize.unwrap_or(true),

            page_format: self.page_format.unwrap_or_default(),
            bottom_margin_mm: positive_or(self.bottom_margin_mm, DEFAULT_BOTTOM_MARGIN_MM),
            spectro_height_mm: positive_or(self.spectro_height_mm, DEFAULT_SPECTRO_HEIGHT_MM),
            writing_speed: positive_or(self.writing_speed, DEFAULT_WRITING_SPEED),
            printer_dpi: positive_int_or(self.printer_dpi, DEFAULT_PRINTER_DPI),
            blur_radius: positive_int_or(self.blur_radius, 0),

            start_time: positive_or(self.start_time, 0.0),
            duration: positive_or(self.duration, 0.0),

            vertical_scale: self.vertical_scale.unwrap_or(false),
            top_reference_line: self.top_reference_line.unwrap_or(false),
            top_reference_offset_mm: positive_or(self.top_reference_offset_mm, DEFAULT_TOP_REFERENCE_OFFSET_MM),
            bottom_reference_line: self.bottom_reference_line.unwrap_or(false),
            bottom_reference_offset_mm: positive_or(
                self.bottom_reference_offset_mm,
                DEFAULT_BOTTOM_REFERENCE_OFFSET_MM,
            ),
            parameter_text: self.parameter_text.unwrap_or(false),
            text_scale: positive_or(self.text_scale, DEFAULT_TEXT_SCALE),
            line_scale: positive_or(self.line_scale, DEFAULT_LINE_SCALE),
        };

        if resolved.pre_emphasis_alpha >= 1.0 {
            warn!("Pre-emphasis alpha {} is not below 1.0", resolved.pre_emphasis_alpha);
        }
        debug!("Resolved settings: {:?}", resolved);
        resolved
    }

    /// Load settings from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let settings: GenerationSettings = serde_json::from_str(&json)?;
        Ok(settings)
    }

    /// Save settings as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

fn positive_or(value: f64, default: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        default
    }
}

/// Positive integers saturate at `u32::MAX`; anything else is `default`.
fn positive_int_or(value: i64, default: u32) -> u32 {
    if value > 0 {
        u32::try_from(value).unwrap_or(u32::MAX)
    } else {
        default
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
#[allow(dead_code)]
enum FlagRepr {
    Bool(bool),
    Int(i64),
    Other(serde::de::IgnoredAny),
}

/// Accept `true`/`false`/`0`/`1`; anything else leaves the flag unset.
fn lenient_flag<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let repr = Option::<FlagRepr>::deserialize(deserializer)?;
    Ok(match repr {
        Some(FlagRepr::Bool(flag)) => Some(flag),
        Some(FlagRepr::Int(0)) => Some(false),
        Some(FlagRepr::Int(1)) => Some(true),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_settings_resolve_to_defaults() {
        let resolved = GenerationSettings::default().resolve();
        assert_eq!(resolved.bins_per_second, DEFAULT_BINS_PER_SECOND);
        assert_eq!(resolved.min_freq, 65.0);
        assert_eq!(resolved.max_freq, 16640.0);
        assert_eq!(resolved.dynamic_range_db, 60.0);
        assert_eq!(resolved.gamma, 0.8);
        assert_eq!(resolved.contrast, 1.9);
        assert_eq!(resolved.writing_speed, 2.5);
        assert_eq!(resolved.printer_dpi, 800);
        assert_eq!(resolved.overlap_preset, OverlapPreset::Medium);
        assert_eq!(resolved.page_format, PageFormat::A4Portrait);
        assert_eq!(resolved.fft_size, None);
        assert!(resolved.pre_emphasis);
        assert!(!resolved.high_pass);
        assert!(resolved.normalize);
        assert!(!resolved.dithering);
        assert!(resolved.log_amplitude && resolved.log_frequency);
    }

    #[test]
    fn test_non_positive_numbers_fall_back() {
        let settings = GenerationSettings {
            gamma: -1.0,
            contrast: 0.0,
            writing_speed: f64::NAN,
            bins_per_second: 300.0,
            ..Default::default()
        };
        let resolved = settings.resolve();
        assert_eq!(resolved.gamma, DEFAULT_GAMMA);
        assert_eq!(resolved.contrast, DEFAULT_CONTRAST);
        assert_eq!(resolved.writing_speed, DEFAULT_WRITING_SPEED);
        assert_eq!(resolved.bins_per_second, 300.0);
    }

    #[test]
    fn test_partial_json_with_integer_flags() {
        let json = r#"{
            "bins_per_second": 200,
            "dithering": 1,
            "normalize": 0,
            "high_pass": 7,
            "overlap_preset": "high",
            "page_format": "a3-landscape"
        }"#;
        let settings: GenerationSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.dithering, Some(true));
        assert_eq!(settings.normalize, Some(false));
        assert_eq!(settings.high_pass, None);

        let resolved = settings.resolve();
        assert_eq!(resolved.bins_per_second, 200.0);
        assert!(resolved.dithering);
        assert!(!resolved.normalize);
        assert!(!resolved.high_pass);
        assert_eq!(resolved.overlap_preset, OverlapPreset::High);
        assert_eq!(resolved.page_format.size_mm(), (420.0, 297.0));
    }

    #[test]
    fn test_partial_json_with_negative_integers() {
        let json = r#"{
            "printer_dpi": -300,
            "high_pass_order": -1,
            "fft_size": -4096,
            "blur_radius": -2,
            "gamma": 1.2
        }"#;
        let resolved = serde_json::from_str::<GenerationSettings>(json).unwrap().resolve();
        assert_eq!(resolved.printer_dpi, DEFAULT_PRINTER_DPI);
        assert_eq!(resolved.high_pass_order, DEFAULT_HIGH_PASS_ORDER);
        assert_eq!(resolved.fft_size, None);
        assert_eq!(resolved.blur_radius, 0);
        assert_eq!(resolved.gamma, 1.2);

        let json = r#"{ "printer_dpi": 600, "fft_size": 2048, "high_pass_order": 0, "blur_radius": 3 }"#;
        let resolved = serde_json::from_str::<GenerationSettings>(json).unwrap().resolve();
        assert_eq!(resolved.printer_dpi, 600);
        assert_eq!(resolved.fft_size, Some(2048));
        assert_eq!(resolved.high_pass_order, DEFAULT_HIGH_PASS_ORDER);
        assert_eq!(resolved.blur_radius, 3);
    }

    #[test]
    fn test_huge_integers_saturate() {
        let settings = GenerationSettings { printer_dpi: i64::MAX, ..Default::default() };
        assert_eq!(settings.resolve().printer_dpi, u32::MAX);
    }

    #[test]
    fn test_settings_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = GenerationSettings {
            min_freq: 100.0,
            vertical_scale: Some(true),
            ..Default::default()
        };
        settings.save(&path).unwrap();
        let loaded = GenerationSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_output_kind_from_extension() {
        assert_eq!(OutputKind::from_path(Path::new("out.PNG")), Some(OutputKind::Raster));
        assert_eq!(OutputKind::from_path(Path::new("dir/out.pdf")), Some(OutputKind::Vector));
        assert_eq!(OutputKind::from_path(Path::new("out.svg")), None);
        assert_eq!(OutputKind::from_path(Path::new("out")), None);
    }
}
