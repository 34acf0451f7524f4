//! Chunked, server-paced file uploads over a realtime channel with a
//! single-shot HTTP fallback.
//!
//! The entry point is [`coordinator::UploadCoordinator`]: it runs one
//! realtime [`session::UploadSession`] per request and, when that attempt
//! fails, switches to the [`fallback::FallbackUploader`] while keeping a single
//! status stream for the caller.

pub mod channel;
pub mod chunk;
pub mod config;
pub mod coordinator;
pub mod fallback;
pub mod metrics;
pub mod remote;
pub mod request;
pub mod session;
pub mod source;

pub use config::UploaderConfig;
pub use coordinator::{StatusStream, UploadCoordinator, UploadError, UploadStatus};
pub use request::{UploadBinding, UploadRequest};
