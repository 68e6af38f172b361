use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

/// File handed to an edit or variation request. The MIME type is declared
/// from the file name, not sniffed, so a renamed file is judged by its name.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Arc<[u8]>,
}

impl UploadedAsset {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("image.png")
            .to_string();
        let mime_type = mime_for_name(&file_name)
            .unwrap_or("application/octet-stream")
            .to_string();
        Ok(Self::new(file_name, mime_type, bytes))
    }

    pub fn byte_len(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl fmt::Debug for UploadedAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedAsset")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("byte_len", &self.bytes.len())
            .finish()
    }
}

pub fn mime_for_name(name: &str) -> Option<&'static str> {
    let ext = Path::new(name)
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadSlot {
    /// Source image for edit, or the square PNG for variation.
    Image,
    Mask,
}

impl UploadSlot {
    pub fn as_str(self) -> &'static str {
        match self {
            UploadSlot::Image => "image",
            UploadSlot::Mask => "mask",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Uploads {
    pub image: Option<UploadedAsset>,
    pub mask: Option<UploadedAsset>,
}

impl Uploads {
    pub fn slot_mut(&mut self, slot: UploadSlot) -> &mut Option<UploadedAsset> {
        match slot {
            UploadSlot::Image => &mut self.image,
            UploadSlot::Mask => &mut self.mask,
        }
    }
}
