//! Single-shot HTTP upload used when the realtime attempt fails.

mod uploader;

pub use uploader::FallbackUploader;
