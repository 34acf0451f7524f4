//! Metrics for upload operations, recorded through the `metrics` facade.
//!
//! The library never installs a recorder; hosts that want the numbers plug
//! in their own exporter.
//!
//! Key metrics:
//! - Uploads started, completed and failed, by path (realtime or fallback)
//! - Slices and bytes sent over the realtime channel
//! - Fallback switches, by failure reason

pub mod recorder;

pub use recorder::{
    init_metrics, record_fallback, record_slice_sent, record_upload_complete,
    record_upload_failed, record_upload_size, UploadMetrics, UploadPath,
};
