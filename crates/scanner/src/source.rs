//! Turning uploads and camera stills into the single [`CaptureAsset`] the
//! controller holds.
use crate::error::SourceError;
use anyhow::Context;
use capture::EncodedStill;
use recognition::ImagePayload;
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Upload,
    Camera,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Upload => "upload",
            SourceKind::Camera => "camera",
        }
    }
}

/// A file handed over by the picker.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.map(str::to_string),
            bytes,
        }
    }

    /// Read a file from disk. The media type comes from the extension, or from
    /// the leading bytes when the extension is unknown.
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

        let content_type = image::ImageFormat::from_path(path)
            .or_else(|_| image::guess_format(&bytes))
            .ok()
            .map(|format| format.to_mime_type().to_string());

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        Ok(Self {
            file_name,
            content_type,
            bytes,
        })
    }

    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|t| t.trim().to_ascii_lowercase().starts_with("image/"))
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    live: Mutex<HashSet<u64>>,
}

/// Hands out displayable preview references and tracks which are still alive.
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    inner: Arc<RegistryInner>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn open(&self) -> PreviewHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id);
        PreviewHandle {
            id,
            registry: Arc::clone(&self.inner),
        }
    }

    /// Previews handed out and not yet released.
    pub fn live_count(&self) -> usize {
        self.inner.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Released when dropped.
#[derive(Debug)]
pub struct PreviewHandle {
    id: u64,
    registry: Arc<RegistryInner>,
}

impl PreviewHandle {
    pub fn uri(&self) -> String {
        format!("preview:{}", self.id)
    }
}

impl fmt::Display for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "preview:{}", self.id)
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.registry
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
        tracing::trace!(preview = self.id, "Preview released");
    }
}

/// The one image the scan flow is working on.
#[derive(Debug)]
pub struct CaptureAsset {
    image: ImagePayload,
    preview: PreviewHandle,
    source: SourceKind,
}

impl CaptureAsset {
    /// Request payload; shares the image bytes with the asset.
    pub fn payload(&self) -> ImagePayload {
        self.image.clone()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.image.bytes
    }

    pub fn preview(&self) -> &PreviewHandle {
        &self.preview
    }

    pub fn source(&self) -> SourceKind {
        self.source
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImageSourceResolver {
    previews: PreviewRegistry,
}

impl ImageSourceResolver {
    pub fn new(previews: PreviewRegistry) -> Self {
        Self { previews }
    }

    pub fn previews(&self) -> &PreviewRegistry {
        &self.previews
    }

    /// Accept any `image/*` file. Size is not capped.
    pub fn from_upload(&self, file: UploadFile) -> Result<CaptureAsset, SourceError> {
        if !file.is_image() {
            return Err(SourceError::NotAnImage {
                file_name: file.file_name,
                content_type: file.content_type,
            });
        }

        let mime = file.content_type.unwrap_or_default();
        tracing::debug!(
            file = %file.file_name,
            mime = %mime,
            size = file.bytes.len(),
            "Upload accepted"
        );

        Ok(CaptureAsset {
            image: ImagePayload::new(file.bytes, file.file_name, mime),
            preview: self.previews.open(),
            source: SourceKind::Upload,
        })
    }

    pub fn from_capture(&self, still: EncodedStill) -> CaptureAsset {
        CaptureAsset {
            image: ImagePayload::new(still.bytes, EncodedStill::FILE_NAME, EncodedStill::MIME),
            preview: self.previews.open(),
            source: SourceKind::Camera,
        }
    }
}
