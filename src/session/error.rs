use std::time::Duration;
use thiserror::Error;

use super::types::FailureReason;
use crate::remote::RemoteError;
use crate::source::SourceError;

#[derive(Error, Debug)]
pub enum SessionError {
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

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

impl SessionError {
    pub fn reason(&self) -> FailureReason {
        match self {
            SessionError::InvalidSource(_) => FailureReason::InvalidSource,
            SessionError::NoChannel(_) => FailureReason::NoChannel,
            SessionError::InvalidName(_) => FailureReason::InvalidName,
            SessionError::Disconnected => FailureReason::Disconnected,
            SessionError::Timeout(_) => FailureReason::Timeout,
            // An out-of-order event is a protocol violation by the server.
            SessionError::ServerRejectedUpload(_) | SessionError::InvalidStateTransition(_) => {
                FailureReason::ServerRejectedUpload
            }
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
