//! Conversions between raw image bytes, the base64 transport encoding and
//! [`ImageHandle`]s.

use std::path::Path;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::conversation::InlineData;
use crate::image::{ImageHandle, DEFAULT_IMAGE_MIME};

pub fn encode(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decodes a base64 transport string. A full `data:` URL is accepted too.
pub fn decode(transport: &str) -> Result<Vec<u8>> {
    let payload = match split_data_url(transport) {
        Some((_, data)) => data,
        None => transport.trim(),
    };
    BASE64
        .decode(payload.as_bytes())
        .context("image base64 decode failed")
}

pub fn to_loadable(bytes: impl Into<Vec<u8>>, mime_type: &str) -> ImageHandle {
    ImageHandle::new(bytes, mime_type)
}

pub fn to_raw_bytes(image: &ImageHandle) -> Vec<u8> {
    image.bytes().to_vec()
}

pub fn to_data_url(image: &ImageHandle) -> String {
    format!("data:{};base64,{}", image.mime_type(), encode(image.bytes()))
}

pub fn from_data_url(url: &str) -> Result<ImageHandle> {
    let Some((mime, data)) = split_data_url(url) else {
        bail!("not a base64 data URL");
    };
    let bytes = BASE64
        .decode(data.as_bytes())
        .context("data URL base64 decode failed")?;
    Ok(ImageHandle::new(bytes, mime))
}

pub fn to_inline_data(image: &ImageHandle) -> InlineData {
    InlineData {
        mime_type: image.mime_type().to_string(),
        data: encode(image.bytes()),
    }
}

pub fn from_inline_data(inline: &InlineData) -> Result<ImageHandle> {
    let bytes = decode(&inline.data)?;
    Ok(ImageHandle::new(bytes, &inline.mime_type))
}

pub fn load_image_file(path: &Path) -> Result<ImageHandle> {
    let bytes = std::fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    let mime = mime_for_path(path).unwrap_or(DEFAULT_IMAGE_MIME);
    Ok(ImageHandle::new(bytes, mime))
}

pub fn save_image_file(path: &Path, image: &ImageHandle) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, image.bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    let lowered = mime.trim().to_ascii_lowercase();
    match lowered.strip_prefix("image/").unwrap_or(lowered.as_str()) {
        "jpg" | "jpeg" => "jpg",
        "webp" => "webp",
        "gif" => "gif",
        _ => "png",
    }
}

fn split_data_url(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.trim().strip_prefix("data:")?;
    let (header, data) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    Some((mime, data))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn encode_decode_roundtrips_arbitrary_bytes() -> anyhow::Result<()> {
        let samples: [&[u8]; 4] = [b"", b"\x00", b"\xff\xfe\x00\x01png", &[7u8; 1000]];
        for sample in samples {
            assert_eq!(decode(&encode(sample))?, sample);
        }
        Ok(())
    }

    #[test]
    fn decode_accepts_data_url() -> anyhow::Result<()> {
        let bytes = decode("data:image/png;base64,aGVsbG8=")?;
        assert_eq!(bytes, b"hello");
        Ok(())
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode("not base64 !!").is_err());
    }

    #[test]
    fn data_url_roundtrip_keeps_mime() -> anyhow::Result<()> {
        let image = to_loadable(vec![1, 2, 3, 4], "image/webp");
        let url = to_data_url(&image);
        assert!(url.starts_with("data:image/webp;base64,"));
        let parsed = from_data_url(&url)?;
        assert_eq!(parsed, image);
        assert_eq!(to_raw_bytes(&parsed), vec![1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn from_data_url_requires_base64_header() {
        assert!(from_data_url("data:text/plain,hello").is_err());
        assert!(from_data_url("aGVsbG8=").is_err());
    }

    #[test]
    fn inline_data_roundtrip() -> anyhow::Result<()> {
        let image = to_loadable(b"jpegish".to_vec(), "image/jpeg");
        let inline = to_inline_data(&image);
        assert_eq!(inline.mime_type, "image/jpeg");
        assert_eq!(from_inline_data(&inline)?, image);
        Ok(())
    }

    #[test]
    fn load_image_file_sniffs_mime_from_extension() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let jpg = temp.path().join("ref.JPG");
        let unknown = temp.path().join("ref.bin");
        std::fs::write(&jpg, b"jpg")?;
        std::fs::write(&unknown, b"bin")?;

        assert_eq!(load_image_file(&jpg)?.mime_type(), "image/jpeg");
        assert_eq!(load_image_file(&unknown)?.mime_type(), DEFAULT_IMAGE_MIME);
        assert!(load_image_file(&temp.path().join("missing.png")).is_err());
        Ok(())
    }

    #[test]
    fn save_image_file_creates_parent_dirs() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("out.png");
        let image = to_loadable(b"png".to_vec(), "image/png");
        save_image_file(&path, &image)?;
        assert_eq!(std::fs::read(&path)?, b"png");
        Ok(())
    }

    #[test]
    fn extension_for_mime_maps_known_types() {
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("IMAGE/WEBP"), "webp");
        assert_eq!(extension_for_mime("application/octet-stream"), "png");
        assert_eq!(mime_for_path(Path::new("a.jpeg")), Some("image/jpeg"));
    }
}
