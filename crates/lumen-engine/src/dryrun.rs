use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use lumen_contracts::codec;
use lumen_contracts::conversation::{ContentPart, InlineData};
use sha2::{Digest, Sha256};

use crate::provider::{EditResponse, GenerateRequest, RemoteEditClient};
use crate::raster::{decode_rgba, encode_png};

const DRYRUN_LONG_SIDE: u32 = 256;

/// Offline backend producing deterministic placeholder images.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunClient;

impl DryrunClient {
    pub fn new() -> Self {
        Self
    }
}

impl RemoteEditClient for DryrunClient {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(&self, request: &GenerateRequest) -> Result<EditResponse> {
        let (width, height) = dims_for_aspect_ratio(&request.aspect_ratio, DRYRUN_LONG_SIDE);
        let [r, g, b] = color_from_prompt(&request.prompt, request.context.len() as u64);
        let pixels = RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255]));
        let image = encode_png(pixels)?;

        Ok(EditResponse {
            parts: vec![
                ContentPart::text(format!(
                    "dryrun render {width}x{height} for: {}",
                    request.prompt.trim()
                )),
                ContentPart::inline(codec::to_inline_data(&image)),
            ],
            warnings: Vec::new(),
        })
    }

    fn remove_background(&self, image: &InlineData) -> Result<EditResponse> {
        let source = codec::from_inline_data(image)?;
        let mut pixels = decode_rgba(&source).context("dryrun background removal failed")?;
        if let Some(corner) = pixels.get_pixel_checked(0, 0).copied() {
            for pixel in pixels.pixels_mut() {
                if pixel.0[..3] == corner.0[..3] {
                    pixel.0[3] = 0;
                }
            }
        }
        let cut_out = encode_png(pixels)?;
        Ok(EditResponse {
            parts: vec![ContentPart::inline(codec::to_inline_data(&cut_out))],
            warnings: Vec::new(),
        })
    }
}

/// `16:9` with a long side of 256 -> `(256, 144)`. Unparseable ratios are square.
fn dims_for_aspect_ratio(ratio: &str, long_side: u32) -> (u32, u32) {
    let parsed = ratio.trim().split_once(':').and_then(|(w, h)| {
        let w = w.trim().parse::<u32>().ok()?;
        let h = h.trim().parse::<u32>().ok()?;
        (w > 0 && h > 0).then_some((w, h))
    });
    let Some((w, h)) = parsed else {
        return (long_side, long_side);
    };
    if w >= h {
        (long_side, scale_side(long_side, h, w))
    } else {
        (scale_side(long_side, w, h), long_side)
    }
}

/// `long_side * num / den` with `num <= den`, so the result fits back in `u32`.
fn scale_side(long_side: u32, num: u32, den: u32) -> u32 {
    let scaled = u64::from(long_side) * u64::from(num) / u64::from(den);
    u32::try_from(scaled).unwrap_or(long_side).max(1)
}

fn color_from_prompt(prompt: &str, seed: u64) -> [u8; 3] {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seed.to_be_bytes());
    let digest = hasher.finalize();
    [digest[0], digest[1], digest[2]]
}
