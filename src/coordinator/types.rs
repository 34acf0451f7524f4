use serde::{Deserialize, Serialize};

use super::error::{ErrorKind, UploadError};
use crate::remote::RemoteResource;
use crate::session::DetailError;

/// What the caller sees of an upload. Exactly one of `Completed`, `Error` or
/// `DetailError` ends a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum UploadStatus {
    Ready,
    Uploading {
        file_name: String,
        progress: u8,
        has_progress: bool,
    },
    Completed {
        result: RemoteResource,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
    /// The bytes are stored but attaching them to the record failed.
    DetailError {
        result: DetailError,
    },
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Completed { .. } | UploadStatus::Error { .. } | UploadStatus::DetailError { .. }
        )
    }

    pub fn error(err: &UploadError) -> Self {
        UploadStatus::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
