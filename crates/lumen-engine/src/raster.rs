use std::io::Cursor;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, RgbaImage};
use lumen_contracts::image::ImageHandle;

pub const PNG_MIME: &str = "image/png";

pub fn decode_rgba(image: &ImageHandle) -> Result<RgbaImage> {
    let decoded = image::load_from_memory(image.bytes())
        .with_context(|| format!("failed to decode {} image", image.mime_type()))?;
    Ok(decoded.to_rgba8())
}

pub fn encode_png(pixels: RgbaImage) -> Result<ImageHandle> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(pixels)
        .write_to(&mut out, ImageFormat::Png)
        .context("failed to encode png")?;
    Ok(ImageHandle::new(out.into_inner(), PNG_MIME))
}
