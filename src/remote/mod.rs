//! Request/response calls to the backend: name validation, metadata
//! finalization and the whole-file upload used by the fallback path.

pub mod error;
pub mod http;
pub mod memory;
pub mod types;

pub use error::{RemoteError, RemoteResult};
pub use http::{HttpBackend, HttpBackendConfig, RequestBody};
pub use memory::{MemoryRemote, Reply};
pub use types::{unwrap_message, FallbackForm, FinalizeRequest, RemoteApi, RemoteResource};
