//! Image selection and preview handles.
//!
//! `SelectedImage` is what the file picker hands to the controller: the raw
//! bytes plus the MIME type sniffed from them. `PreviewRegistry` owns the
//! decoded thumbnails the UI draws; each one is reachable only through a
//! `PreviewHandle`, which is consumed when released so it cannot be released
//! twice.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{ImageFormat, RgbaImage};
use thiserror::Error;

/// MIME types the picker lets through. Nothing else is validated client-side.
pub const ACCEPTED_MIME_TYPES: [&str; 2] = ["image/png", "image/jpeg"];

const PREVIEW_MAX_EDGE: u32 = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Arc<Vec<u8>>,
}

impl SelectedImage {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes: Arc::new(bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum PickError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{name} looks like {mime}; only PNG and JPEG images are accepted")]
    Unsupported { name: String, mime: String },
}

/// Read `path` the way the file picker does: the content decides the type,
/// and anything that is not PNG or JPEG is refused.
pub fn load_selection(path: &Path) -> Result<SelectedImage, PickError> {
    let bytes = fs::read(path).map_err(|source| PickError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string());

    let mime = sniff_mime(&bytes);
    if !ACCEPTED_MIME_TYPES.contains(&mime) {
        return Err(PickError::Unsupported {
            name,
            mime: mime.to_string(),
        });
    }

    Ok(SelectedImage::new(name, mime, bytes))
}

/// Image signatures first; the shared-mime database only names whatever else it is.
fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(other) => other.to_mime_type(),
        Err(_) => tree_magic_mini::from_u8(bytes),
    }
}

/// Turn raw picker input into a path. Strips surrounding quotes (terminals add
/// them on drag-and-drop) and expands a leading `~`. Blank input means "no file".
pub fn resolve_picker_path(input: &str) -> Option<PathBuf> {
    let trimmed = input.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(trimmed)
        .trim();
    if unquoted.is_empty() {
        return None;
    }

    if unquoted == "~" {
        return dirs::home_dir();
    }
    if let Some(rest) = unquoted.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return Some(home.join(rest));
        }
    }
    Some(PathBuf::from(unquoted))
}

/// Opaque reference to a live preview. Not `Clone`: releasing consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct PreviewHandle {
    id: u64,
}

impl PreviewHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug)]
pub struct Preview {
    /// `None` when the bytes could not be decoded; the UI shows a placeholder.
    pub thumbnail: Option<RgbaImage>,
    pub dimensions: Option<(u32, u32)>,
}

#[derive(Debug, Default)]
pub struct PreviewRegistry {
    next_id: u64,
    live: HashMap<u64, Preview>,
    released: u64,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self, image: &SelectedImage) -> PreviewHandle {
        self.next_id += 1;
        let id = self.next_id;
        self.live.insert(id, decode_preview(image));
        tracing::debug!(id, file = %image.file_name, "preview acquired");
        PreviewHandle { id }
    }

    pub fn resolve(&self, handle: &PreviewHandle) -> Option<&Preview> {
        self.live.get(&handle.id)
    }

    /// Returns `false` if the handle did not belong to a live preview.
    pub fn release(&mut self, handle: PreviewHandle) -> bool {
        if self.live.remove(&handle.id).is_some() {
            self.released += 1;
            tracing::debug!(id = handle.id, "preview released");
            true
        } else {
            tracing::warn!(id = handle.id, "release of unknown preview handle");
            false
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn acquired_count(&self) -> u64 {
        self.next_id
    }

    pub fn released_count(&self) -> u64 {
        self.released
    }
}

fn decode_preview(image: &SelectedImage) -> Preview {
    match image::load_from_memory(&image.bytes) {
        Ok(decoded) => Preview {
            dimensions: Some((decoded.width(), decoded.height())),
            thumbnail: Some(decoded.thumbnail(PREVIEW_MAX_EDGE, PREVIEW_MAX_EDGE).to_rgba8()),
        },
        Err(err) => {
            tracing::debug!(file = %image.file_name, "preview decode failed: {err}");
            Preview {
                thumbnail: None,
                dimensions: None,
            }
        }
    }
}
