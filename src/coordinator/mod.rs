mod coordinator;
mod error;
mod stream;
mod types;

pub use coordinator::UploadCoordinator;
pub use error::{ErrorKind, UploadError, UploadResult};
pub use stream::StatusStream;
pub use types::UploadStatus;
