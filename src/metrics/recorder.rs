//! Metrics recorder for upload operations

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Which transfer path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPath {
    Realtime,
    Fallback,
}

impl UploadPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadPath::Realtime => "realtime",
            UploadPath::Fallback => "fallback",
        }
    }
}

impl fmt::Display for UploadPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    describe_counter!("liveupload_uploads_started_total", "Uploads accepted by the coordinator");
    describe_counter!(
        "liveupload_uploads_completed_total",
        "Uploads that reached a successful terminal status"
    );
    describe_counter!(
        "liveupload_uploads_failed_total",
        "Uploads that reached a failure terminal status"
    );
    describe_counter!("liveupload_slices_sent_total", "Slices sent over the realtime channel");
    describe_counter!("liveupload_bytes_sent_total", "Bytes sent over the realtime channel");
    describe_counter!(
        "liveupload_fallbacks_total",
        "Realtime attempts that switched to the HTTP fallback"
    );

    describe_gauge!("liveupload_active_uploads", "Uploads currently in flight");

    describe_histogram!("liveupload_upload_duration_seconds", "Time to a terminal status");
    describe_histogram!("liveupload_upload_size_bytes", "Size of uploaded files");
}

/// Record one slice leaving over the realtime channel
pub fn record_slice_sent(bytes: usize) {
    counter!("liveupload_slices_sent_total").increment(1);
    counter!("liveupload_bytes_sent_total").increment(bytes as u64);
}

/// Record a switch from the realtime path to the fallback
pub fn record_fallback(reason: &str) {
    counter!("liveupload_fallbacks_total", "reason" => reason.to_string()).increment(1);
}

fn record_upload_started() {
    counter!("liveupload_uploads_started_total").increment(1);
    gauge!("liveupload_active_uploads").increment(1.0);
}

/// Record the size of a source once it has been read
pub fn record_upload_size(file_size: u64) {
    histogram!("liveupload_upload_size_bytes").record(file_size as f64);
}

/// Record an upload completing successfully
pub fn record_upload_complete(path: UploadPath, duration: Duration) {
    counter!("liveupload_uploads_completed_total", "path" => path.as_str()).increment(1);
    gauge!("liveupload_active_uploads").decrement(1.0);
    histogram!("liveupload_upload_duration_seconds", "path" => path.as_str())
        .record(duration.as_secs_f64());
}

/// Record an upload failing
pub fn record_upload_failed(kind: &str) {
    counter!("liveupload_uploads_failed_total", "kind" => kind.to_string()).increment(1);
    gauge!("liveupload_active_uploads").decrement(1.0);
}

/// Times one upload and records exactly one outcome for it
pub struct UploadMetrics {
    start_time: Instant,
    path: UploadPath,
    finished: bool,
}

impl UploadMetrics {
    /// Start tracking a new upload
    pub fn start() -> Self {
        record_upload_started();
        Self {
            start_time: Instant::now(),
            path: UploadPath::Realtime,
            finished: false,
        }
    }

    /// Note that the fallback took over
    pub fn switch_to_fallback(&mut self, reason: &str) {
        if self.path == UploadPath::Realtime {
            record_fallback(reason);
            self.path = UploadPath::Fallback;
        }
    }

    pub fn path(&self) -> UploadPath {
        self.path
    }

    pub fn complete(&mut self) {
        if !std::mem::replace(&mut self.finished, true) {
            record_upload_complete(self.path, self.start_time.elapsed());
        }
    }

    pub fn fail(&mut self, kind: &str) {
        if !std::mem::replace(&mut self.finished, true) {
            record_upload_failed(kind);
        }
    }

    /// Get current duration
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Drop for UploadMetrics {
    fn drop(&mut self) {
        // Cancelled uploads produce no outcome but must leave the gauge.
        if !self.finished {
            gauge!("liveupload_active_uploads").decrement(1.0);
        }
    }
}
