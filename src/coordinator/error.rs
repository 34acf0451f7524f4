use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::remote::RemoteError;
use crate::session::SessionError;
use crate::source::SourceError;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid source: {0}")]
    InvalidSource(#[from] SourceError),

    #[error("Realtime channel unavailable after {0:?}")]
    NoChannel(Duration),

    #[error("File name rejected: {0}")]
    InvalidName(#[source] RemoteError),

    #[error("Realtime channel disconnected")]
    Disconnected,

    #[error("No slice request within {0:?}")]
    Timeout(Duration),

    #[error("Server rejected upload: {0}")]
    ServerRejectedUpload(String),

    #[error("Finalize failed for {resource_url}: {detail}")]
    FinalizeFailed { resource_url: String, detail: String },

    #[error("Fallback upload failed: {0}")]
    FallbackFailed(#[source] RemoteError),
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::InvalidSource(_) => ErrorKind::InvalidSource,
            UploadError::NoChannel(_) => ErrorKind::NoChannel,
            UploadError::InvalidName(_) => ErrorKind::InvalidName,
            UploadError::Disconnected => ErrorKind::Disconnected,
            UploadError::Timeout(_) => ErrorKind::Timeout,
            UploadError::ServerRejectedUpload(_) => ErrorKind::ServerRejectedUpload,
            UploadError::FinalizeFailed { .. } => ErrorKind::FinalizeFailed,
            UploadError::FallbackFailed(_) => ErrorKind::FallbackFailed,
        }
    }
}

impl From<SessionError> for UploadError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::InvalidSource(e) => UploadError::InvalidSource(e),
            SessionError::NoChannel(grace) => UploadError::NoChannel(grace),
            SessionError::InvalidName(e) => UploadError::InvalidName(e),
            SessionError::Disconnected => UploadError::Disconnected,
            SessionError::Timeout(period) => UploadError::Timeout(period),
            SessionError::ServerRejectedUpload(detail) => UploadError::ServerRejectedUpload(detail),
            SessionError::InvalidStateTransition(detail) => UploadError::ServerRejectedUpload(detail),
        }
    }
}

/// Serializable tag for an [`UploadError`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidSource,
    NoChannel,
    InvalidName,
    Disconnected,
    Timeout,
    ServerRejectedUpload,
    FinalizeFailed,
    FallbackFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidSource => "invalid_source",
            ErrorKind::NoChannel => "no_channel",
            ErrorKind::InvalidName => "invalid_name",
            ErrorKind::Disconnected => "disconnected",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ServerRejectedUpload => "server_rejected_upload",
            ErrorKind::FinalizeFailed => "finalize_failed",
            ErrorKind::FallbackFailed => "fallback_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type UploadResult<T> = Result<T, UploadError>;
