use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// A platform file object (picker result, drag-and-drop item, ...).
#[async_trait]
pub trait FileHandle: Send + Sync + fmt::Debug {
    fn name(&self) -> Option<String>;

    fn mime_type(&self) -> Option<String> {
        None
    }

    async fn read_all(&self) -> std::io::Result<Bytes>;
}

/// Where the bytes of an upload come from.
#[derive(Debug, Clone)]
pub enum UploadSource {
    Bytes(Bytes),
    Path(PathBuf),
    Handle(Arc<dyn FileHandle>),
}

impl UploadSource {
    pub fn kind(&self) -> &'static str {
        match self {
            UploadSource::Bytes(_) => "bytes",
            UploadSource::Path(_) => "path",
            UploadSource::Handle(_) => "handle",
        }
    }
}

/// Normalized, immutable view of the file being uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub bytes: Bytes,
    pub size: u64,
    pub name: String,
    pub mime_type: Option<String>,
}

impl SourceDescriptor {
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// What the host environment lets the adapter do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceCapabilities {
    pub filesystem: bool,
}

impl SourceCapabilities {
    /// Sandboxed hosts (browser-like) that cannot open paths.
    pub fn without_filesystem() -> Self {
        Self { filesystem: false }
    }
}

impl Default for SourceCapabilities {
    fn default() -> Self {
        Self { filesystem: true }
    }
}
