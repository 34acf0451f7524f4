use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Slice size used by the realtime protocol (24 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 24 * 1024;

/// Tunables for the upload engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploaderConfig {
    /// Bytes per slice sent over the realtime channel.
    pub chunk_size: usize,
    /// How long to wait after `connect()` before re-checking the channel.
    #[serde(with = "millis")]
    pub connect_grace: Duration,
    /// Maximum silence allowed between a slice send and the next request.
    #[serde(with = "millis")]
    pub keepalive_timeout: Duration,
    /// Prefix the server may put in front of public file URLs.
    pub public_prefix: String,
    /// Folder the finalized resource is filed under.
    pub default_folder: String,
    /// Name used when neither the caller nor the source provides one.
    pub default_file_name: String,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_grace: Duration::from_millis(3000),
            keepalive_timeout: Duration::from_millis(10_000),
            public_prefix: "/public".to_string(),
            default_folder: "Home".to_string(),
            default_file_name: "file1".to_string(),
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
