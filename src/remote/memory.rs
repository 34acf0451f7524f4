use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::error::{RemoteError, RemoteResult};
use super::types::{FallbackForm, FinalizeRequest, RemoteApi, RemoteResource};

/// Scripted outcome for one kind of call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Accept,
    Reject(String),
}

impl Reply {
    fn check(&self) -> RemoteResult<()> {
        match self {
            Reply::Accept => Ok(()),
            Reply::Reject(message) => Err(RemoteError::Rejected(message.clone())),
        }
    }
}

#[derive(Debug, Default)]
struct Calls {
    validated: Vec<String>,
    finalized: Vec<FinalizeRequest>,
    uploaded: Vec<FallbackForm>,
}

/// In-process backend that records every call.
///
/// Accepted uploads are stored under `/files/<name>` (or `/private/files/<name>`)
/// and answered inside a `message` envelope like the real backend does.
#[derive(Debug)]
pub struct MemoryRemote {
    validate: Mutex<Reply>,
    rename: Mutex<Option<String>>,
    finalize: Mutex<Reply>,
    upload: Mutex<Reply>,
    calls: Mutex<Calls>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            validate: Mutex::new(Reply::Accept),
            rename: Mutex::new(None),
            finalize: Mutex::new(Reply::Accept),
            upload: Mutex::new(Reply::Accept),
            calls: Mutex::new(Calls::default()),
        }
    }

    pub fn set_validate(&self, reply: Reply) {
        *self.validate.lock() = reply;
    }

    /// Make name validation answer with `name` instead of echoing the input.
    pub fn rename_to(&self, name: impl Into<String>) {
        *self.rename.lock() = Some(name.into());
    }

    pub fn set_finalize(&self, reply: Reply) {
        *self.finalize.lock() = reply;
    }

    pub fn set_upload(&self, reply: Reply) {
        *self.upload.lock() = reply;
    }

    pub fn validated(&self) -> Vec<String> {
        self.calls.lock().validated.clone()
    }

    pub fn finalized(&self) -> Vec<FinalizeRequest> {
        self.calls.lock().finalized.clone()
    }

    pub fn uploaded(&self) -> Vec<FallbackForm> {
        self.calls.lock().uploaded.clone()
    }
}

#[async_trait]
impl RemoteApi for MemoryRemote {
    async fn validate_name(&self, file_name: &str) -> RemoteResult<String> {
        self.calls.lock().validated.push(file_name.to_string());
        self.validate.lock().check()?;
        Ok(self
            .rename
            .lock()
            .clone()
            .unwrap_or_else(|| file_name.to_string()))
    }

    async fn finalize_metadata(&self, request: &FinalizeRequest) -> RemoteResult<RemoteResource> {
        self.calls.lock().finalized.push(request.clone());
        self.finalize.lock().check()?;

        let mut resource = RemoteResource::from_url(request.file_url.clone());
        resource.file_name = request.file_url.rsplit('/').next().map(str::to_string);
        Ok(resource)
    }

    async fn upload_file(&self, form: FallbackForm) -> RemoteResult<Value> {
        let reply = self.upload.lock().clone();
        let root = if form.is_private { "/private/files" } else { "/files" };
        let body = json!({
            "message": {
                "file_url": format!("{root}/{}", form.file_name),
                "file_name": form.file_name,
                "is_private": form.is_private,
            }
        });
        self.calls.lock().uploaded.push(form);
        reply.check()?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn form(name: &str) -> FallbackForm {
        FallbackForm {
            file_name: name.to_string(),
            mime_type: None,
            data: Bytes::from_static(b"abc"),
            is_private: false,
            doctype: None,
            docname: None,
            fieldname: None,
            folder: "Home".to_string(),
        }
    }

    #[tokio::test]
    async fn test_rename_and_reject() {
        let remote = MemoryRemote::new();
        assert_eq!(remote.validate_name("a.txt").await.unwrap(), "a.txt");

        remote.rename_to("a (1).txt");
        assert_eq!(remote.validate_name("a.txt").await.unwrap(), "a (1).txt");

        remote.set_validate(Reply::Reject("bad name".into()));
        assert!(matches!(
            remote.validate_name("a.txt").await,
            Err(RemoteError::Rejected(_))
        ));
        assert_eq!(remote.validated().len(), 3);
    }

    #[tokio::test]
    async fn test_upload_answers_in_envelope() {
        let remote = MemoryRemote::new();
        let body = remote.upload_file(form("a.txt")).await.unwrap();
        let resource = RemoteResource::from_response(body).unwrap();
        assert_eq!(resource.file_url, "/files/a.txt");

        remote.set_upload(Reply::Reject("too large".into()));
        assert!(remote.upload_file(form("b.txt")).await.is_err());
        assert_eq!(remote.uploaded().len(), 2);
    }
}
