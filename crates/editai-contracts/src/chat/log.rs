use std::fmt;

use crate::options::{Mode, RequestOptions};
use crate::uploads::Uploads;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Url(String),
    DataUri { mime: String, base64: String },
}

impl ImageSource {
    pub fn data_uri(mime: impl Into<String>, base64: impl Into<String>) -> Self {
        ImageSource::DataUri {
            mime: mime.into(),
            base64: base64.into(),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, ImageSource::DataUri { .. })
    }

    /// Single-line form for terminal listings; inline payloads are elided.
    pub fn summary(&self) -> String {
        match self {
            ImageSource::Url(url) => url.clone(),
            ImageSource::DataUri { mime, base64 } => {
                format!("data:{mime};base64,<{} chars>", base64.len())
            }
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Url(url) => f.write_str(url),
            ImageSource::DataUri { mime, base64 } => write!(f, "data:{mime};base64,{base64}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSet {
    Single(ImageSource),
    Grid(Vec<ImageSource>),
}

impl ImageSet {
    /// `None` for an empty list; one source collapses to a scalar entry.
    pub fn from_sources(mut sources: Vec<ImageSource>) -> Option<Self> {
        match sources.len() {
            0 => None,
            1 => sources.pop().map(ImageSet::Single),
            _ => Some(ImageSet::Grid(sources)),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ImageSet::Single(_) => 1,
            ImageSet::Grid(sources) => sources.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<&ImageSource> {
        match self {
            ImageSet::Single(source) if index == 0 => Some(source),
            ImageSet::Single(_) => None,
            ImageSet::Grid(sources) => sources.get(index),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageSource> {
        let slice = match self {
            ImageSet::Single(source) => std::slice::from_ref(source),
            ImageSet::Grid(sources) => sources.as_slice(),
        };
        slice.iter()
    }
}

/// Everything needed to issue a request again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub mode: Mode,
    pub options: RequestOptions,
    pub prompt: String,
    pub uploads: Uploads,
    /// Chat index of the user entry that triggered the request.
    pub user_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEntry {
    User {
        text: String,
    },
    Image {
        prompt: String,
        images: ImageSet,
        origin: Submission,
    },
}

impl ChatEntry {
    pub fn kind(&self) -> &'static str {
        match self {
            ChatEntry::User { .. } => "user",
            ChatEntry::Image { .. } => "image",
        }
    }

    pub fn images(&self) -> Option<&ImageSet> {
        match self {
            ChatEntry::Image { images, .. } => Some(images),
            ChatEntry::User { .. } => None,
        }
    }
}

/// Append-only feed; the only mutation is replacing an entry in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatLog {
    entries: Vec<ChatEntry>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ChatEntry) -> usize {
        self.entries.push(entry);
        self.entries.len() - 1
    }

    pub fn replace(&mut self, index: usize, entry: ChatEntry) -> Result<(), String> {
        let len = self.entries.len();
        let slot = self
            .entries
            .get_mut(index)
            .ok_or_else(|| format!("No chat entry at index {index} (log has {len})."))?;
        *slot = entry;
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&ChatEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[ChatEntry] {
        self.entries.as_slice()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
