use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::SessionError;
use crate::remote::RemoteResource;
use crate::source::SourceDescriptor;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FailureReason {
    NoChannel,
    Disconnected,
    ServerRejectedUpload,
    InvalidName,
    Timeout,
    InvalidSource,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::NoChannel => "no_channel",
            FailureReason::Disconnected => "disconnected",
            FailureReason::ServerRejectedUpload => "server_rejected_upload",
            FailureReason::InvalidName => "invalid_name",
            FailureReason::Timeout => "timeout",
            FailureReason::InvalidSource => "invalid_source",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Negotiating,
    Transferring,
    Completed,
    Failed(FailureReason),
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Negotiating | SessionState::Transferring)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Start,
    NameAccepted,
    SliceSent { index: u64 },
    TransferEnded,
    Fail(FailureReason),
}

/// Bytes reached the server but binding them to a record failed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetailError {
    pub resource_url: String,
    pub detail: String,
}

/// What a session reports to whoever observes it.
#[derive(Debug)]
pub enum SessionStatus {
    Ready,
    Uploading {
        file_name: String,
        progress: u8,
        has_progress: bool,
    },
    Completed(RemoteResource),
    DetailError(DetailError),
    Failed {
        error: SessionError,
        /// Present once the source was read, so a fallback need not read it again.
        source: Option<SourceDescriptor>,
    },
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed(_) | SessionStatus::DetailError(_) | SessionStatus::Failed { .. }
        )
    }
}

/// Channel events as the session's event loop sees them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InboundEvent {
    SliceRequest(u64),
    TransferEnd(String),
    TransferError(String),
    Disconnect,
    Malformed { event: &'static str, error: String },
}
