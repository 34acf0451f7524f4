use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

/// Event names spoken by the upload backend.
pub mod events {
    /// Outbound: one slice of the file.
    pub const SLICE_SEND: &str = "upload-accept-slice";
    /// Inbound: server asks for the slice at `currentSlice`.
    pub const SLICE_REQUEST: &str = "upload-request-slice";
    /// Inbound: all bytes received, carries the stored file URL.
    pub const TRANSFER_END: &str = "upload-end";
    /// Inbound: server aborted the upload.
    pub const TRANSFER_ERROR: &str = "upload-error";
    /// Inbound: transport went away.
    pub const DISCONNECT: &str = "disconnect";
}

pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Handle returned by `on`, passed back to `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Body of an outbound slice. `data` travels base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SlicePayload {
    pub is_private: bool,
    pub name: String,
    #[serde(rename = "type", default)]
    pub mime_type: Option<String>,
    pub size: u64,
    #[serde(deserialize_with = "decode_base64")]
    pub data: Bytes,
}

impl SlicePayload {
    pub fn into_value(self) -> Value {
        json!({
            "is_private": self.is_private,
            "name": self.name,
            "type": self.mime_type,
            "size": self.size,
            "data": STANDARD.encode(&self.data),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceRequest {
    #[serde(rename = "currentSlice")]
    pub current_slice: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEnd {
    #[serde(rename = "file_url", alias = "resourceUrl")]
    pub file_url: String,
}

/// Wire envelope used by [`WsChannel`](super::WsChannel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

fn decode_base64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    STANDARD
        .decode(encoded)
        .map(Bytes::from)
        .map_err(serde::de::Error::custom)
}
