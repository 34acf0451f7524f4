pub mod error;
pub mod resolver;
pub mod types;

pub use error::{SourceError, SourceResult};
pub use resolver::{guess_mime_type, SourceResolver};
pub use types::{FileHandle, SourceCapabilities, SourceDescriptor, UploadSource};
