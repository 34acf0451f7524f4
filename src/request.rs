//! Caller-facing description of a single upload.

use crate::source::{FileHandle, UploadSource};
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// A local copy of the target record that a binding writes into.
pub type SharedRecord = Arc<Mutex<Map<String, Value>>>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Upload request has no source (bytes, path or file handle)")]
    MissingSource,

    #[error("Upload request has {0} sources, expected exactly one")]
    AmbiguousSource(usize),
}

/// Record/field that receives the uploaded resource's URL.
#[derive(Debug, Clone)]
pub struct UploadBinding {
    pub collection: String,
    pub record_id: String,
    pub field_name: String,
    pub record: Option<SharedRecord>,
}

impl UploadBinding {
    pub fn new(
        collection: impl Into<String>,
        record_id: impl Into<String>,
        field_name: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            record_id: record_id.into(),
            field_name: field_name.into(),
            record: None,
        }
    }

    pub fn with_record(mut self, record: SharedRecord) -> Self {
        self.record = Some(record);
        self
    }

    /// Set `record[field_name] = resource_url`. Returns false when there is no
    /// local record to update.
    pub fn apply(&self, resource_url: &str) -> bool {
        match &self.record {
            Some(record) if !self.field_name.is_empty() => {
                record.lock().insert(
                    self.field_name.clone(),
                    Value::String(resource_url.to_string()),
                );
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub source: UploadSource,
    pub target_name: Option<String>,
    pub mime_type: Option<String>,
    pub is_private: bool,
    pub folder: Option<String>,
    pub binding: Option<UploadBinding>,
}

impl UploadRequest {
    pub fn new(source: UploadSource) -> Self {
        Self {
            source,
            target_name: None,
            mime_type: None,
            is_private: false,
            folder: None,
            binding: None,
        }
    }

    pub fn builder() -> UploadRequestBuilder {
        UploadRequestBuilder::default()
    }

    /// Apply the binding, if any.
    pub(crate) fn apply_binding(&self, resource_url: &str) {
        if let Some(binding) = &self.binding {
            if binding.apply(resource_url) {
                tracing::debug!(
                    collection = %binding.collection,
                    record = %binding.record_id,
                    field = %binding.field_name,
                    "Bound uploaded file to record"
                );
            }
        }
    }
}

/// Accepts the loose "any of bytes / path / handle" form and checks that
/// exactly one source was given.
#[derive(Debug, Default)]
pub struct UploadRequestBuilder {
    bytes: Option<Bytes>,
    path: Option<PathBuf>,
    file_handle: Option<Arc<dyn FileHandle>>,
    target_name: Option<String>,
    mime_type: Option<String>,
    is_private: bool,
    folder: Option<String>,
    binding: Option<UploadBinding>,
}

impl UploadRequestBuilder {
    pub fn bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.bytes = Some(bytes.into());
        self
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn file_handle(mut self, handle: Arc<dyn FileHandle>) -> Self {
        self.file_handle = Some(handle);
        self
    }

    pub fn target_name(mut self, name: impl Into<String>) -> Self {
        self.target_name = Some(name.into());
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn private(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }

    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn binding(mut self, binding: UploadBinding) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn build(self) -> Result<UploadRequest, RequestError> {
        let mut sources: Vec<UploadSource> = Vec::with_capacity(1);
        if let Some(bytes) = self.bytes {
            sources.push(UploadSource::Bytes(bytes));
        }
        if let Some(path) = self.path {
            sources.push(UploadSource::Path(path));
        }
        if let Some(handle) = self.file_handle {
            sources.push(UploadSource::Handle(handle));
        }

        let source = match sources.len() {
            0 => return Err(RequestError::MissingSource),
            1 => sources.remove(0),
            n => return Err(RequestError::AmbiguousSource(n)),
        };

        Ok(UploadRequest {
            source,
            target_name: self.target_name,
            mime_type: self.mime_type,
            is_private: self.is_private,
            folder: self.folder,
            binding: self.binding,
        })
    }
}
