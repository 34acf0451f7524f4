use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{RemoteError, RemoteResult};
use crate::request::UploadRequest;

/// The stored file as the backend describes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteResource {
    pub file_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RemoteResource {
    pub fn from_url(file_url: impl Into<String>) -> Self {
        Self {
            file_url: file_url.into(),
            name: None,
            file_name: None,
            extra: Map::new(),
        }
    }

    /// Parse a response body, unwrapping a `message` envelope if present.
    pub fn from_response(value: Value) -> RemoteResult<Self> {
        match unwrap_message(value) {
            Value::Object(map) => Ok(serde_json::from_value(Value::Object(map))?),
            other => Err(RemoteError::Rejected(format!(
                "expected a file record, got {other}"
            ))),
        }
    }
}

/// Binds an already transferred file to its record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeRequest {
    pub file_url: String,
    pub is_private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fieldname: Option<String>,
    pub folder: String,
}

impl FinalizeRequest {
    pub fn for_request(request: &UploadRequest, file_url: &str, default_folder: &str) -> Self {
        let binding = request.binding.as_ref();
        Self {
            file_url: file_url.to_string(),
            is_private: request.is_private,
            doctype: binding.map(|b| b.collection.clone()),
            docname: binding.map(|b| b.record_id.clone()),
            fieldname: binding.map(|b| b.field_name.clone()),
            folder: request
                .folder
                .clone()
                .unwrap_or_else(|| default_folder.to_string()),
        }
    }
}

/// Whole-file upload used by the fallback path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackForm {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub data: Bytes,
    pub is_private: bool,
    pub doctype: Option<String>,
    pub docname: Option<String>,
    pub fieldname: Option<String>,
    pub folder: String,
}

impl FallbackForm {
    /// Text fields sent next to the file part.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("is_private", u8::from(self.is_private).to_string()),
            ("folder", self.folder.clone()),
            ("file_name", self.file_name.clone()),
        ];
        if let Some(doctype) = &self.doctype {
            fields.push(("doctype", doctype.clone()));
        }
        if let Some(docname) = &self.docname {
            fields.push(("docname", docname.clone()));
        }
        if let Some(fieldname) = &self.fieldname {
            fields.push(("fieldname", fieldname.clone()));
        }
        fields
    }
}

#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Returns the name the server will store the file under.
    async fn validate_name(&self, file_name: &str) -> RemoteResult<String>;

    async fn finalize_metadata(&self, request: &FinalizeRequest) -> RemoteResult<RemoteResource>;

    /// Raw response body; callers normalize the envelope.
    async fn upload_file(&self, form: FallbackForm) -> RemoteResult<Value>;
}

/// Strip the `{"message": ...}` wrapper the backend puts around results.
pub fn unwrap_message(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("message") => {
            map.remove("message").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::UploadBinding;
    use crate::source::UploadSource;
    use serde_json::json;

    #[test]
    fn test_unwrap_message() {
        assert_eq!(unwrap_message(json!({"message": {"a": 1}})), json!({"a": 1}));
        assert_eq!(unwrap_message(json!({"a": 1})), json!({"a": 1}));
        assert_eq!(unwrap_message(json!("x")), json!("x"));
    }

    #[test]
    fn test_resource_from_response() {
        let resource = RemoteResource::from_response(json!({
            "message": {"file_url": "/files/a.txt", "name": "f-1", "is_private": 0}
        }))
        .unwrap();

        assert_eq!(resource.file_url, "/files/a.txt");
        assert_eq!(resource.name.as_deref(), Some("f-1"));
        assert_eq!(resource.extra["is_private"], 0);

        assert!(RemoteResource::from_response(json!({"message": null})).is_err());
    }

    #[test]
    fn test_finalize_request_carries_binding() {
        let mut request = UploadRequest::new(UploadSource::Bytes(Bytes::new()));
        request.binding = Some(UploadBinding::new("Note", "N-1", "attachment"));

        let finalize = FinalizeRequest::for_request(&request, "/files/a", "Home");
        assert_eq!(finalize.doctype.as_deref(), Some("Note"));
        assert_eq!(finalize.docname.as_deref(), Some("N-1"));
        assert_eq!(finalize.fieldname.as_deref(), Some("attachment"));
        assert_eq!(finalize.folder, "Home");

        let value = serde_json::to_value(&finalize).unwrap();
        assert_eq!(value["file_url"], "/files/a");
    }

    #[test]
    fn test_fallback_form_fields() {
        let form = FallbackForm {
            file_name: "a.txt".into(),
            mime_type: None,
            data: Bytes::from_static(b"abc"),
            is_private: true,
            doctype: None,
            docname: None,
            fieldname: None,
            folder: "Home".into(),
        };

        let fields = form.fields();
        assert!(fields.contains(&("is_private", "1".to_string())));
        assert!(!fields.iter().any(|(k, _)| *k == "doctype"));
    }
}
