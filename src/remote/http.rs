//! `reqwest` implementation of [`RemoteApi`].

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::error::{RemoteError, RemoteResult};
use super::types::{unwrap_message, FallbackForm, FinalizeRequest, RemoteApi, RemoteResource};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpBackendConfig {
    pub base_url: String,
    pub validate_name_path: String,
    pub upload_path: String,
    pub timeout_secs: u64,
    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            validate_name_path: "/api/method/validate_file_name".to_string(),
            upload_path: "/api/method/upload_file".to_string(),
            timeout_secs: 60,
            headers: Vec::new(),
        }
    }
}

pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(Form),
}

pub struct HttpBackend {
    http: reqwest::Client,
    config: HttpBackendConfig,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> RemoteResult<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| RemoteError::InvalidHeader(name.clone()))?;
            let value =
                HeaderValue::from_str(value).map_err(|_| RemoteError::InvalidHeader(value.clone()))?;
            headers.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { http, config })
    }

    pub fn config(&self) -> &HttpBackendConfig {
        &self.config
    }

    /// Send one request and return the decoded JSON body.
    pub async fn request(
        &self,
        endpoint: &str,
        method: Method,
        headers: HeaderMap,
        body: RequestBody,
    ) -> RemoteResult<Value> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let builder = self
            .http
            .request(method.clone(), &url)
            .headers(headers)
            .header(reqwest::header::ACCEPT, "application/json");

        let builder = match body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Multipart(form) => builder.multipart(form),
        };

        debug!(%method, %url, "Backend request");
        let resp = builder.send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl RemoteApi for HttpBackend {
    async fn validate_name(&self, file_name: &str) -> RemoteResult<String> {
        let body = self
            .request(
                &self.config.validate_name_path,
                Method::POST,
                HeaderMap::new(),
                RequestBody::Json(json!({ "filename": file_name })),
            )
            .await?;

        match unwrap_message(body) {
            Value::String(name) if !name.is_empty() => Ok(name),
            Value::Object(map) => match map.get("name").and_then(Value::as_str) {
                Some(name) if !name.is_empty() => Ok(name.to_string()),
                _ => Err(RemoteError::Rejected(format!("no name for {file_name}"))),
            },
            _ => Err(RemoteError::Rejected(format!("no name for {file_name}"))),
        }
    }

    async fn finalize_metadata(&self, request: &FinalizeRequest) -> RemoteResult<RemoteResource> {
        let body = self
            .request(
                &self.config.upload_path,
                Method::POST,
                HeaderMap::new(),
                RequestBody::Json(serde_json::to_value(request)?),
            )
            .await?;
        RemoteResource::from_response(body)
    }

    async fn upload_file(&self, form: FallbackForm) -> RemoteResult<Value> {
        let mut multipart = Form::new();
        for (key, value) in form.fields() {
            multipart = multipart.text(key, value);
        }

        let mut part = Part::bytes(form.data.to_vec()).file_name(form.file_name.clone());
        if let Some(mime) = &form.mime_type {
            part = part.mime_str(mime)?;
        }
        multipart = multipart.part("file", part);

        self.request(
            &self.config.upload_path,
            Method::POST,
            HeaderMap::new(),
            RequestBody::Multipart(multipart),
        )
        .await
    }
}
