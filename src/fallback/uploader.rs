use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::UploaderConfig;
use crate::coordinator::UploadError;
use crate::metrics;
use crate::remote::{FallbackForm, RemoteApi, RemoteResource};
use crate::request::UploadRequest;
use crate::source::{SourceDescriptor, SourceResolver};

/// Posts the whole file in one multipart request. Never retries.
#[derive(Clone)]
pub struct FallbackUploader {
    remote: Arc<dyn RemoteApi>,
    resolver: SourceResolver,
    config: Arc<UploaderConfig>,
}

impl FallbackUploader {
    pub fn new(remote: Arc<dyn RemoteApi>, resolver: SourceResolver, config: Arc<UploaderConfig>) -> Self {
        Self {
            remote,
            resolver,
            config,
        }
    }

    /// Upload `request` once. `source` is the descriptor the realtime attempt
    /// already read, if it got that far.
    pub async fn upload_once(
        &self,
        request: &UploadRequest,
        source: Option<SourceDescriptor>,
    ) -> Result<RemoteResource, UploadError> {
        let descriptor = match source {
            Some(descriptor) => descriptor,
            None => {
                debug!("Resolving source for fallback upload");
                let descriptor = self.resolver.resolve(request).await?;
                metrics::record_upload_size(descriptor.size);
                descriptor
            }
        };

        let form = self.form_for(request, descriptor);
        info!(name = %form.file_name, size = form.data.len(), "Uploading over HTTP");

        let body = self.remote.upload_file(form).await.map_err(|e| {
            warn!("Fallback upload failed: {e}");
            UploadError::FallbackFailed(e)
        })?;
        let resource = RemoteResource::from_response(body).map_err(UploadError::FallbackFailed)?;

        request.apply_binding(&resource.file_url);
        Ok(resource)
    }

    fn form_for(&self, request: &UploadRequest, descriptor: SourceDescriptor) -> FallbackForm {
        let binding = request.binding.as_ref();
        FallbackForm {
            file_name: descriptor.name,
            mime_type: descriptor.mime_type,
            data: descriptor.bytes,
            is_private: request.is_private,
            doctype: binding.map(|b| b.collection.clone()),
            docname: binding.map(|b| b.record_id.clone()),
            fieldname: binding.map(|b| b.field_name.clone()),
            folder: request
                .folder
                .clone()
                .unwrap_or_else(|| self.config.default_folder.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryRemote, Reply};
    use crate::request::UploadBinding;
    use crate::source::SourceCapabilities;
    use parking_lot::Mutex;
    use serde_json::Map;

    fn uploader(remote: Arc<MemoryRemote>, capabilities: SourceCapabilities) -> FallbackUploader {
        FallbackUploader::new(
            remote,
            SourceResolver::new(capabilities, "file1"),
            Arc::new(UploaderConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_upload_applies_binding() {
        let remote = Arc::new(MemoryRemote::new());
        let record = Arc::new(Mutex::new(Map::new()));
        let request = UploadRequest::builder()
            .bytes(&b"abc"[..])
            .target_name("a.txt")
            .binding(UploadBinding::new("Note", "N-1", "attachment").with_record(record.clone()))
            .build()
            .unwrap();

        let resource = uploader(remote.clone(), SourceCapabilities::default())
            .upload_once(&request, None)
            .await
            .unwrap();

        assert_eq!(resource.file_url, "/files/a.txt");
        assert_eq!(record.lock()["attachment"], "/files/a.txt");

        let form = &remote.uploaded()[0];
        assert_eq!(form.doctype.as_deref(), Some("Note"));
        assert_eq!(form.docname.as_deref(), Some("N-1"));
        assert_eq!(form.folder, "Home");
        assert_eq!(form.mime_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_reuses_descriptor() {
        let remote = Arc::new(MemoryRemote::new());
        let request = UploadRequest::builder().path("/nowhere/x.bin").build().unwrap();
        let descriptor = SourceDescriptor {
            bytes: bytes::Bytes::from_static(b"xyz"),
            size: 3,
            name: "x.bin".to_string(),
            mime_type: None,
        };

        // The path is never read because the descriptor is already there.
        let resource = uploader(remote, SourceCapabilities::without_filesystem())
            .upload_once(&request, Some(descriptor))
            .await
            .unwrap();
        assert_eq!(resource.file_url, "/files/x.bin");
    }

    #[tokio::test]
    async fn test_unusable_source() {
        let remote = Arc::new(MemoryRemote::new());
        let request = UploadRequest::builder().path("/nowhere/x.bin").build().unwrap();

        let err = uploader(remote.clone(), SourceCapabilities::without_filesystem())
            .upload_once(&request, None)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidSource(_)));
        assert!(remote.uploaded().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_upload() {
        let remote = Arc::new(MemoryRemote::new());
        remote.set_upload(Reply::Reject("too large".into()));
        let request = UploadRequest::builder().bytes(&b"abc"[..]).build().unwrap();

        let err = uploader(remote.clone(), SourceCapabilities::default())
            .upload_once(&request, None)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::FallbackFailed(_)));
        assert_eq!(remote.uploaded().len(), 1);
    }
}
