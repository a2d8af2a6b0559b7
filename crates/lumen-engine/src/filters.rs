//! Local, deterministic pixel adjustments.
//!
//! Six bounded parameters are composed into one per-pixel pipeline that runs
//! in a fixed order (brightness, contrast, saturate, grayscale, sepia,
//! invert). Channels are non-premultiplied sRGB values in `[0, 1]`; every
//! stage clamps its output and alpha is never touched. Stages sitting at
//! their identity value are skipped, so an untouched stack reproduces the
//! source pixels exactly.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use image::RgbaImage;
use lumen_contracts::image::ImageHandle;

use crate::raster::{decode_rgba, encode_png};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterKind {
    Brightness,
    Contrast,
    Saturate,
    Grayscale,
    Sepia,
    Invert,
}

impl FilterKind {
    /// Pipeline order.
    pub const ALL: [FilterKind; 6] = [
        FilterKind::Brightness,
        FilterKind::Contrast,
        FilterKind::Saturate,
        FilterKind::Grayscale,
        FilterKind::Sepia,
        FilterKind::Invert,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Brightness => "brightness",
            Self::Contrast => "contrast",
            Self::Saturate => "saturate",
            Self::Grayscale => "grayscale",
            Self::Sepia => "sepia",
            Self::Invert => "invert",
        }
    }

    pub fn max(self) -> u8 {
        match self {
            Self::Brightness | Self::Contrast | Self::Saturate => 200,
            Self::Grayscale | Self::Sepia | Self::Invert => 100,
        }
    }

    pub fn identity(self) -> u8 {
        match self {
            Self::Brightness | Self::Contrast | Self::Saturate => 100,
            Self::Grayscale | Self::Sepia | Self::Invert => 0,
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FilterKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let lowered = raw.trim().to_ascii_lowercase();
        FilterKind::ALL
            .into_iter()
            .find(|kind| kind.name() == lowered)
            .with_context(|| {
                let known = FilterKind::ALL.map(FilterKind::name).join(", ");
                format!("unknown filter '{raw}' (expected one of: {known})")
            })
    }
}

/// The six filter values, each kept inside its slider range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterParams {
    values: [u8; 6],
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            values: FilterKind::ALL.map(FilterKind::identity),
        }
    }
}

impl FilterParams {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: FilterKind) -> u8 {
        self.values[slot(kind)]
    }

    /// Stores `value` clamped to the parameter's range and returns what was stored.
    pub fn set(&mut self, kind: FilterKind, value: i64) -> u8 {
        let clamped = value.clamp(0, i64::from(kind.max())) as u8;
        self.values[slot(kind)] = clamped;
        clamped
    }

    pub fn with(mut self, kind: FilterKind, value: i64) -> Self {
        self.set(kind, value);
        self
    }

    /// Applies one `name=value` assignment as typed by a user.
    pub fn assign(&mut self, name: &str, value: &str) -> Result<(FilterKind, u8)> {
        let kind = name.parse::<FilterKind>()?;
        let trimmed = value.trim().trim_end_matches('%');
        let Ok(parsed) = trimmed.parse::<i64>() else {
            bail!("filter '{kind}' expects an integer, got '{value}'");
        };
        Ok((kind, self.set(kind, parsed)))
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// CSS-style rendering, e.g. `brightness(150%) contrast(100%) ...`.
    pub fn css(&self) -> String {
        FilterKind::ALL
            .into_iter()
            .map(|kind| format!("{}({}%)", kind.name(), self.get(kind)))
            .collect::<Vec<String>>()
            .join(" ")
    }
}

fn slot(kind: FilterKind) -> usize {
    match kind {
        FilterKind::Brightness => 0,
        FilterKind::Contrast => 1,
        FilterKind::Saturate => 2,
        FilterKind::Grayscale => 3,
        FilterKind::Sepia => 4,
        FilterKind::Invert => 5,
    }
}

type Matrix = [[f64; 3]; 3];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    /// `c * slope + intercept`, per channel.
    Linear { slope: f64, intercept: f64 },
    Matrix(Matrix),
}

impl Stage {
    fn apply(&self, rgb: [f64; 3]) -> [f64; 3] {
        match self {
            Stage::Linear { slope, intercept } => rgb.map(|c| clamp_unit(c * slope + intercept)),
            Stage::Matrix(m) => {
                let [r, g, b] = rgb;
                [
                    clamp_unit(m[0][0] * r + m[0][1] * g + m[0][2] * b),
                    clamp_unit(m[1][0] * r + m[1][1] * g + m[1][2] * b),
                    clamp_unit(m[2][0] * r + m[2][1] * g + m[2][2] * b),
                ]
            }
        }
    }
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn pipeline(params: &FilterParams) -> Vec<Stage> {
    let mut stages = Vec::new();
    for kind in FilterKind::ALL {
        let value = params.get(kind);
        if value == kind.identity() {
            continue;
        }
        let amount = f64::from(value) / 100.0;
        stages.push(match kind {
            FilterKind::Brightness => Stage::Linear {
                slope: amount,
                intercept: 0.0,
            },
            FilterKind::Contrast => Stage::Linear {
                slope: amount,
                intercept: 0.5 - 0.5 * amount,
            },
            FilterKind::Saturate => Stage::Matrix(saturate_matrix(amount)),
            FilterKind::Grayscale => Stage::Matrix(grayscale_matrix(amount)),
            FilterKind::Sepia => Stage::Matrix(sepia_matrix(amount)),
            FilterKind::Invert => Stage::Linear {
                slope: 1.0 - 2.0 * amount,
                intercept: amount,
            },
        });
    }
    stages
}

fn saturate_matrix(s: f64) -> Matrix {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

fn grayscale_matrix(amount: f64) -> Matrix {
    let a = 1.0 - amount;
    [
        [0.2126 + 0.7874 * a, 0.7152 - 0.7152 * a, 0.0722 - 0.0722 * a],
        [0.2126 - 0.2126 * a, 0.7152 + 0.2848 * a, 0.0722 - 0.0722 * a],
        [0.2126 - 0.2126 * a, 0.7152 - 0.7152 * a, 0.0722 + 0.9278 * a],
    ]
}

fn sepia_matrix(amount: f64) -> Matrix {
    let a = 1.0 - amount;
    [
        [0.393 + 0.607 * a, 0.769 - 0.769 * a, 0.189 - 0.189 * a],
        [0.349 - 0.349 * a, 0.686 + 0.314 * a, 0.168 - 0.168 * a],
        [0.272 - 0.272 * a, 0.534 - 0.534 * a, 0.131 + 0.869 * a],
    ]
}

/// Holds the current filter values and renders them onto rasters.
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    params: FilterParams,
}

impl FilterEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: FilterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> FilterParams {
        self.params
    }

    pub fn get(&self, kind: FilterKind) -> u8 {
        self.params.get(kind)
    }

    pub fn set(&mut self, kind: FilterKind, value: i64) -> u8 {
        self.params.set(kind, value)
    }

    pub fn reset(&mut self) {
        self.params = FilterParams::identity();
    }

    pub fn apply(&self, pixels: &mut RgbaImage) {
        let stages = pipeline(&self.params);
        if stages.is_empty() {
            return;
        }
        for pixel in pixels.pixels_mut() {
            let [r, g, b, a] = pixel.0;
            let mut rgb = [r, g, b].map(|c| f64::from(c) / 255.0);
            for stage in &stages {
                rgb = stage.apply(rgb);
            }
            let [r, g, b] = rgb.map(|c| (c * 255.0).round() as u8);
            pixel.0 = [r, g, b, a];
        }
    }

    /// Flattens `source` through the current stack into a new PNG image.
    pub fn commit(&self, source: &ImageHandle) -> Result<ImageHandle> {
        let mut pixels = decode_rgba(source)?;
        self.apply(&mut pixels);
        encode_png(pixels)
    }
}

/// Interactive adjustment surface seeded with one image.
///
/// Nothing outside the editor changes until the caller commits and hands the
/// result to the session; dropping the editor discards the adjustments.
#[derive(Debug, Clone)]
pub struct FilterEditor {
    source: ImageHandle,
    engine: FilterEngine,
}

impl FilterEditor {
    pub fn new(source: ImageHandle) -> Self {
        Self {
            source,
            engine: FilterEngine::new(),
        }
    }

    pub fn source(&self) -> &ImageHandle {
        &self.source
    }

    pub fn params(&self) -> FilterParams {
        self.engine.params()
    }

    pub fn get(&self, kind: FilterKind) -> u8 {
        self.engine.get(kind)
    }

    pub fn set(&mut self, kind: FilterKind, value: i64) -> u8 {
        self.engine.set(kind, value)
    }

    pub fn assign(&mut self, name: &str, value: &str) -> Result<(FilterKind, u8)> {
        self.engine.params.assign(name, value)
    }

    pub fn reset(&mut self) {
        self.engine.reset();
    }

    pub fn commit(&self) -> Result<ImageHandle> {
        self.engine.commit(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::{FilterEditor, FilterEngine, FilterKind, FilterParams};
    use crate::raster::{decode_rgba, encode_png};

    fn single_pixel(rgba: [u8; 4]) -> anyhow::Result<lumen_contracts::image::ImageHandle> {
        let mut pixels = RgbaImage::new(1, 1);
        pixels.put_pixel(0, 0, Rgba(rgba));
        encode_png(pixels)
    }

    fn committed_pixel(params: FilterParams, rgba: [u8; 4]) -> anyhow::Result<[u8; 4]> {
        let source = single_pixel(rgba)?;
        let out = FilterEngine::with_params(params).commit(&source)?;
        Ok(decode_rgba(&out)?.get_pixel(0, 0).0)
    }

    fn gradient() -> RgbaImage {
        RgbaImage::from_fn(16, 8, |x, y| {
            Rgba([(x * 16) as u8, (y * 32) as u8, ((x + y) * 9) as u8, 200 + y as u8])
        })
    }

    #[test]
    fn values_are_clamped_to_slider_ranges() {
        let mut params = FilterParams::identity();
        assert_eq!(params.set(FilterKind::Brightness, 250), 200);
        assert_eq!(params.set(FilterKind::Sepia, 150), 100);
        assert_eq!(params.set(FilterKind::Contrast, -5), 0);
        assert_eq!(params.get(FilterKind::Brightness), 200);
    }

    #[test]
    fn assign_parses_names_and_percentages() -> anyhow::Result<()> {
        let mut params = FilterParams::identity();
        assert_eq!(
            params.assign("Saturate", "150%")?,
            (FilterKind::Saturate, 150)
        );
        assert!(params.assign("blur", "3").is_err());
        assert!(params.assign("invert", "lots").is_err());
        Ok(())
    }

    #[test]
    fn css_lists_filters_in_pipeline_order() {
        let params = FilterParams::identity().with(FilterKind::Brightness, 150);
        assert_eq!(
            params.css(),
            "brightness(150%) contrast(100%) saturate(100%) grayscale(0%) sepia(0%) invert(0%)"
        );
    }

    #[test]
    fn brightness_on_white_pixel_clamps_to_white() -> anyhow::Result<()> {
        let params = FilterParams::identity().with(FilterKind::Brightness, 150);
        assert_eq!(committed_pixel(params, [255, 255, 255, 255])?, [255, 255, 255, 255]);
        Ok(())
    }

    #[test]
    fn brightness_scales_mid_grey() -> anyhow::Result<()> {
        let params = FilterParams::identity().with(FilterKind::Brightness, 150);
        assert_eq!(committed_pixel(params, [100, 100, 100, 255])?, [150, 150, 150, 255]);
        Ok(())
    }

    #[test]
    fn invert_grayscale_and_sepia_follow_filter_matrices() -> anyhow::Result<()> {
        let invert = FilterParams::identity().with(FilterKind::Invert, 100);
        assert_eq!(committed_pixel(invert, [0, 128, 255, 255])?, [255, 127, 0, 255]);

        let grayscale = FilterParams::identity().with(FilterKind::Grayscale, 100);
        assert_eq!(committed_pixel(grayscale, [255, 0, 0, 255])?, [54, 54, 54, 255]);

        let sepia = FilterParams::identity().with(FilterKind::Sepia, 100);
        assert_eq!(committed_pixel(sepia, [255, 255, 255, 255])?, [255, 255, 239, 255]);
        Ok(())
    }

    #[test]
    fn alpha_is_preserved() -> anyhow::Result<()> {
        let params = FilterParams::identity()
            .with(FilterKind::Contrast, 180)
            .with(FilterKind::Invert, 40);
        assert_eq!(committed_pixel(params, [90, 90, 90, 77])?[3], 77);
        Ok(())
    }

    #[test]
    fn stages_run_in_fixed_order() -> anyhow::Result<()> {
        // brightness(0) zeroes the colour before invert runs, so the result is white.
        let params = FilterParams::identity()
            .with(FilterKind::Brightness, 0)
            .with(FilterKind::Invert, 100);
        assert_eq!(committed_pixel(params, [12, 200, 99, 255])?, [255, 255, 255, 255]);
        Ok(())
    }

    #[test]
    fn reset_then_commit_reproduces_source_pixels() -> anyhow::Result<()> {
        let source_pixels = gradient();
        let source = encode_png(source_pixels.clone())?;

        let mut engine = FilterEngine::new();
        engine.set(FilterKind::Sepia, 80);
        engine.set(FilterKind::Contrast, 30);
        engine.reset();
        assert!(engine.params().is_identity());

        let reset_out = engine.commit(&source)?;
        let untouched_out = FilterEngine::new().commit(&source)?;
        assert_eq!(reset_out, untouched_out);
        assert_eq!(decode_rgba(&reset_out)?, source_pixels);
        Ok(())
    }

    #[test]
    fn commit_is_deterministic() -> anyhow::Result<()> {
        let source = encode_png(gradient())?;
        let params = FilterParams::identity()
            .with(FilterKind::Brightness, 130)
            .with(FilterKind::Saturate, 170)
            .with(FilterKind::Sepia, 35);
        let first = FilterEngine::with_params(params).commit(&source)?;
        let second = FilterEngine::with_params(params).commit(&source)?;
        assert_eq!(first.bytes(), second.bytes());
        assert_ne!(first.bytes(), source.bytes());
        Ok(())
    }

    #[test]
    fn editor_commit_leaves_source_untouched() -> anyhow::Result<()> {
        let source = single_pixel([40, 80, 120, 255])?;
        let mut editor = FilterEditor::new(source.clone());
        editor.assign("grayscale", "100")?;
        let committed = editor.commit()?;
        assert_eq!(editor.source(), &source);
        assert_ne!(committed, source);
        assert_eq!(committed.mime_type(), "image/png");
        Ok(())
    }

    #[test]
    fn unknown_filter_name_lists_choices() {
        let err = "glow".parse::<FilterKind>().err().map(|err| err.to_string());
        assert_eq!(
            err.as_deref(),
            Some("unknown filter 'glow' (expected one of: brightness, contrast, saturate, grayscale, sepia, invert)")
        );
    }
}
