use bytes::Bytes;
use std::path::Path;

use tracing::debug;

use super::error::{SourceError, SourceResult};
use super::types::{SourceCapabilities, SourceDescriptor, UploadSource};
use crate::request::UploadRequest;

/// Turns an [`UploadRequest`] source into a [`SourceDescriptor`].
#[derive(Debug, Clone)]
pub struct SourceResolver {
    capabilities: SourceCapabilities,
    default_name: String,
}

impl SourceResolver {
    pub fn new(capabilities: SourceCapabilities, default_name: impl Into<String>) -> Self {
        Self {
            capabilities,
            default_name: default_name.into(),
        }
    }

    pub fn capabilities(&self) -> SourceCapabilities {
        self.capabilities
    }

    /// Read the source once and fill in name, size and MIME type.
    pub async fn resolve(&self, request: &UploadRequest) -> SourceResult<SourceDescriptor> {
        let (bytes, source_name, source_mime) = match &request.source {
            UploadSource::Bytes(bytes) => (bytes.clone(), None, None),
            UploadSource::Path(path) => {
                if !self.capabilities.filesystem {
                    return Err(SourceError::FilesystemUnavailable(path.clone()));
                }
                let data = tokio::fs::read(path)
                    .await
                    .map_err(|source| SourceError::Unreadable {
                        path: path.clone(),
                        source,
                    })?;
                (Bytes::from(data), file_name_of(path), None)
            }
            UploadSource::Handle(handle) => {
                let data = handle.read_all().await.map_err(SourceError::Handle)?;
                (data, handle.name(), handle.mime_type())
            }
        };

        let name = non_empty(request.target_name.clone())
            .or_else(|| non_empty(source_name))
            .unwrap_or_else(|| self.default_name.clone());

        let mime_type = non_empty(request.mime_type.clone())
            .or_else(|| non_empty(source_mime))
            .or_else(|| guess_mime_type(&name).map(str::to_string));

        debug!(
            source = request.source.kind(),
            name = %name,
            size = bytes.len(),
            "Resolved upload source"
        );

        Ok(SourceDescriptor {
            size: bytes.len() as u64,
            bytes,
            name,
            mime_type,
        })
    }
}

impl Default for SourceResolver {
    fn default() -> Self {
        Self::new(SourceCapabilities::default(), "file1")
    }
}

fn file_name_of(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// MIME type from the file extension, for the handful of types that matter.
pub fn guess_mime_type(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => return None,
    };
    Some(mime)
}
