use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::RealtimeChannel;
use crate::config::UploaderConfig;
use crate::coordinator::error::UploadError;
use crate::coordinator::stream::StatusStream;
use crate::coordinator::types::UploadStatus;
use crate::fallback::FallbackUploader;
use crate::metrics::UploadMetrics;
use crate::remote::RemoteApi;
use crate::request::UploadRequest;
use crate::session::{SessionError, SessionState, SessionStateMachine, SessionStatus, UploadSession};
use crate::source::{SourceCapabilities, SourceDescriptor, SourceResolver};

/// Bookkeeping for an upload that has not reached a terminal status yet.
#[derive(Clone)]
struct ActiveUpload {
    cancel: CancellationToken,
    machine: SessionStateMachine,
}

/// Public entry point: one realtime session per request, with the HTTP
/// fallback taking over when the session fails.
#[derive(Clone)]
pub struct UploadCoordinator {
    channel: Arc<dyn RealtimeChannel>,
    remote: Arc<dyn RemoteApi>,
    resolver: SourceResolver,
    config: Arc<UploaderConfig>,
    fallback: FallbackUploader,

    // One realtime session on the channel at a time
    channel_lock: Arc<Semaphore>,

    // Uploads in flight, by upload id
    active: Arc<DashMap<String, ActiveUpload>>,
}

impl UploadCoordinator {
    pub fn new(
        channel: Arc<dyn RealtimeChannel>,
        remote: Arc<dyn RemoteApi>,
        config: UploaderConfig,
        capabilities: SourceCapabilities,
    ) -> Self {
        let config = Arc::new(config);
        let resolver = SourceResolver::new(capabilities, config.default_file_name.clone());
        let fallback = FallbackUploader::new(remote.clone(), resolver.clone(), config.clone());

        Self {
            channel,
            remote,
            resolver,
            config,
            fallback,
            channel_lock: Arc::new(Semaphore::new(1)),
            active: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Start an upload. The returned stream yields `Ready`, any number of
    /// `Uploading`, then exactly one terminal status, and closes.
    ///
    /// Uploads share the channel one at a time; later ones wait their turn
    /// after `Ready`.
    pub fn upload(&self, request: UploadRequest) -> StatusStream {
        let request = Arc::new(request);
        let cancel = CancellationToken::new();
        let session = UploadSession::new(
            self.channel.clone(),
            self.remote.clone(),
            self.resolver.clone(),
            self.config.clone(),
        )
        .with_cancel(cancel.clone())
        .with_channel_lock(self.channel_lock.clone());

        let upload_id = session.id().to_string();
        self.active.insert(
            upload_id.clone(),
            ActiveUpload {
                cancel: cancel.clone(),
                machine: session.state_machine(),
            },
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = self.clone();
        let worker_id = upload_id.clone();
        tokio::spawn(async move {
            coordinator.upload_worker(session, request, cancel, tx).await;
            coordinator.active.remove(&worker_id);
        });

        StatusStream::new(upload_id, rx)
    }

    async fn upload_worker(
        &self,
        session: UploadSession,
        request: Arc<UploadRequest>,
        cancel: CancellationToken,
        updates: mpsc::UnboundedSender<UploadStatus>,
    ) {
        let upload_id = session.id().to_string();
        let mut metrics = UploadMetrics::start();
        let mut handle = session.start(request.clone());
        let mut failure: Option<(SessionError, Option<SourceDescriptor>)> = None;

        while let Some(status) = handle.next().await {
            match status {
                SessionStatus::Ready => {
                    let _ = updates.send(UploadStatus::Ready);
                }
                SessionStatus::Uploading {
                    file_name,
                    progress,
                    has_progress,
                } => {
                    let _ = updates.send(UploadStatus::Uploading {
                        file_name,
                        progress,
                        has_progress,
                    });
                }
                SessionStatus::Completed(result) => {
                    metrics.complete();
                    let _ = updates.send(UploadStatus::Completed { result });
                    return;
                }
                SessionStatus::DetailError(result) => {
                    let err = UploadError::FinalizeFailed {
                        resource_url: result.resource_url.clone(),
                        detail: result.detail.clone(),
                    };
                    metrics.fail(err.kind().as_str());
                    let _ = updates.send(UploadStatus::DetailError { result });
                    return;
                }
                SessionStatus::Failed { error, source } => {
                    failure = Some((error, source));
                    break;
                }
            }
        }

        // No failure means the session was destroyed.
        let Some((error, source)) = failure else {
            debug!(upload = %upload_id, "Upload cancelled");
            return;
        };
        if cancel.is_cancelled() {
            return;
        }

        let reason = error.reason();
        info!(upload = %upload_id, %reason, "Realtime upload failed, switching to HTTP: {error}");
        metrics.switch_to_fallback(reason.as_str());

        let _ = updates.send(UploadStatus::Uploading {
            file_name: self.display_name(&request, source.as_ref()),
            progress: 0,
            has_progress: false,
        });

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(upload = %upload_id, "Fallback cancelled");
                return;
            }
            result = self.fallback.upload_once(&request, source) => result,
        };

        match result {
            Ok(result) => {
                info!(upload = %upload_id, url = %result.file_url, "Fallback upload completed");
                metrics.complete();
                let _ = updates.send(UploadStatus::Completed { result });
            }
            Err(err) => {
                warn!(upload = %upload_id, kind = %err.kind(), "Upload failed: {err}");
                metrics.fail(err.kind().as_str());
                let _ = updates.send(UploadStatus::error(&err));
            }
        }
    }

    fn display_name(&self, request: &UploadRequest, source: Option<&SourceDescriptor>) -> String {
        source
            .map(|d| d.name.clone())
            .or_else(|| request.target_name.clone())
            .unwrap_or_else(|| self.config.default_file_name.clone())
    }

    /// Cancel one upload. Its stream closes without a terminal status.
    pub fn cancel_upload(&self, upload_id: &str) -> bool {
        match self.active.remove(upload_id) {
            Some((_, upload)) => {
                upload.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every upload in flight.
    pub fn destroy(&self) {
        let ids: Vec<String> = self.list_active();
        for id in &ids {
            self.cancel_upload(id);
        }
        if !ids.is_empty() {
            info!(count = ids.len(), "Cancelled in-flight uploads");
        }
    }

    /// Realtime session state of an upload still in flight
    pub fn get_state(&self, upload_id: &str) -> Option<SessionState> {
        self.active
            .get(upload_id)
            .map(|upload| upload.machine.current_state())
    }

    /// List uploads in flight
    pub fn list_active(&self) -> Vec<String> {
        self.active.iter().map(|e| e.key().clone()).collect()
    }
}
