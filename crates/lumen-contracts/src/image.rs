use std::fmt;
use std::sync::Arc;

pub const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Immutable, cheaply cloneable reference to encoded raster bytes.
///
/// Clones share the same allocation; there is no way to mutate the bytes
/// once the handle exists. Equality compares bytes and MIME type.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ImageHandle {
    bytes: Arc<[u8]>,
    mime_type: Arc<str>,
}

impl ImageHandle {
    pub fn new(bytes: impl Into<Vec<u8>>, mime_type: &str) -> Self {
        Self {
            bytes: Arc::from(bytes.into()),
            mime_type: Arc::from(normalize_mime(mime_type)),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageHandle")
            .field("mime_type", &self.mime_type())
            .field("len", &self.len())
            .finish()
    }
}

fn normalize_mime(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return DEFAULT_IMAGE_MIME.to_string();
    }
    trimmed.to_ascii_lowercase()
}
