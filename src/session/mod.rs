pub mod error;
pub mod keepalive;
mod listeners;
mod session;
pub mod state_machine;
pub mod types;

pub use error::{SessionError, SessionResult};
pub use keepalive::KeepAlive;
pub use session::{strip_public_prefix, SessionHandle, UploadSession};
pub use state_machine::SessionStateMachine;
pub use types::{DetailError, FailureReason, SessionEvent, SessionState, SessionStatus};
