//! One realtime upload attempt.
//!
//! The session resolves the source, makes sure the channel is up, has the
//! server validate the file name, and then answers the server's slice
//! requests one at a time until the server reports the end of the transfer.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{SessionError, SessionResult};
use super::keepalive::KeepAlive;
use super::listeners::ChannelSubscriptions;
use super::state_machine::SessionStateMachine;
use super::types::{DetailError, InboundEvent, SessionEvent, SessionState, SessionStatus};
use crate::channel::{events, RealtimeChannel, SlicePayload};
use crate::chunk::SliceCursor;
use crate::config::UploaderConfig;
use crate::metrics;
use crate::remote::{FinalizeRequest, RemoteApi, RemoteResource};
use crate::request::UploadRequest;
use crate::source::{SourceDescriptor, SourceResolver};

/// How the transfer phase ended when it did not fail.
enum Finished {
    Completed(RemoteResource),
    DetailError(DetailError),
}

pub struct UploadSession {
    id: String,
    channel: Arc<dyn RealtimeChannel>,
    remote: Arc<dyn RemoteApi>,
    resolver: SourceResolver,
    config: Arc<UploaderConfig>,
    machine: SessionStateMachine,
    cancel: CancellationToken,
    channel_lock: Option<Arc<Semaphore>>,
}

/// Caller side of a running session.
pub struct SessionHandle {
    id: String,
    machine: SessionStateMachine,
    cancel: CancellationToken,
    statuses: mpsc::UnboundedReceiver<SessionStatus>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.machine.current_state()
    }

    /// Next status, or `None` once the session has ended.
    pub async fn next(&mut self) -> Option<SessionStatus> {
        self.statuses.recv().await
    }

    /// Stop the session. Listeners are removed and no terminal status follows.
    pub fn destroy(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl UploadSession {
    pub fn new(
        channel: Arc<dyn RealtimeChannel>,
        remote: Arc<dyn RemoteApi>,
        resolver: SourceResolver,
        config: Arc<UploaderConfig>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel,
            remote,
            resolver,
            config,
            machine: SessionStateMachine::new(),
            cancel: CancellationToken::new(),
            channel_lock: None,
        }
    }

    /// Tie the session to an outer cancellation scope.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Share a single-permit lock with every other session on the same
    /// channel. Only the holder negotiates and transfers; the others wait.
    pub fn with_channel_lock(mut self, lock: Arc<Semaphore>) -> Self {
        self.channel_lock = Some(lock);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.machine.current_state()
    }

    /// Shared view of this session's state.
    pub fn state_machine(&self) -> SessionStateMachine {
        self.machine.clone()
    }

    /// Run the session on its own task.
    pub fn start(self, request: Arc<UploadRequest>) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.id.clone();
        let machine = self.machine.clone();
        let cancel = self.cancel.clone();

        let task = tokio::spawn(async move {
            self.run(&request, &tx).await;
        });

        SessionHandle {
            id,
            machine,
            cancel,
            statuses: rx,
            task,
        }
    }

    /// Drive the upload to a terminal status, which is always the last thing
    /// sent on `updates`. If cancelled, nothing terminal is sent.
    pub async fn run(&self, request: &UploadRequest, updates: &mpsc::UnboundedSender<SessionStatus>) {
        let mut listeners = ChannelSubscriptions::new(self.channel.clone());
        let mut keepalive = KeepAlive::new(self.config.keepalive_timeout);
        let mut source: Option<SourceDescriptor> = None;

        let _ = updates.send(SessionStatus::Ready);

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = self.drive(request, updates, &mut listeners, &mut keepalive, &mut source) => Some(result),
        };

        listeners.teardown();
        keepalive.clear();

        let status = match outcome {
            None => {
                debug!(session = %self.id, "Session cancelled");
                return;
            }
            Some(Ok(Finished::Completed(resource))) => {
                info!(session = %self.id, url = %resource.file_url, "Realtime upload completed");
                SessionStatus::Completed(resource)
            }
            Some(Ok(Finished::DetailError(detail))) => {
                warn!(session = %self.id, url = %detail.resource_url, "Finalize failed: {}", detail.detail);
                SessionStatus::DetailError(detail)
            }
            Some(Err(error)) => {
                let reason = error.reason();
                if let Err(e) = self.machine.transition(SessionEvent::Fail(reason)) {
                    debug!(session = %self.id, "{e}");
                }
                warn!(session = %self.id, %reason, "Realtime upload failed: {error}");
                SessionStatus::Failed { error, source }
            }
        };

        let _ = updates.send(status);
    }

    async fn drive(
        &self,
        request: &UploadRequest,
        updates: &mpsc::UnboundedSender<SessionStatus>,
        listeners: &mut ChannelSubscriptions,
        keepalive: &mut KeepAlive,
        source: &mut Option<SourceDescriptor>,
    ) -> SessionResult<Finished> {
        self.machine.transition(SessionEvent::Start)?;

        let descriptor = self.resolver.resolve(request).await?;
        metrics::record_upload_size(descriptor.size);
        *source = Some(descriptor.clone());

        // Inbound events carry no upload id, so one session at a time.
        if let Some(lock) = &self.channel_lock {
            if lock.available_permits() == 0 {
                debug!(session = %self.id, "Waiting for the channel");
            }
            if let Ok(permit) = lock.clone().acquire_owned().await {
                listeners.hold(permit);
            }
        }

        self.ensure_connected().await?;

        let file_name = match self.remote.validate_name(&descriptor.name).await {
            Ok(name) if !name.is_empty() => name,
            Ok(_) => descriptor.name.clone(),
            Err(e) => return Err(SessionError::InvalidName(e)),
        };
        self.machine.transition(SessionEvent::NameAccepted)?;

        let mut inbound = listeners.subscribe_all();
        let mut cursor = SliceCursor::new(descriptor.bytes.clone(), self.config.chunk_size);
        let mut progress = 0u8;

        debug!(
            session = %self.id,
            name = %file_name,
            size = descriptor.size,
            slices = cursor.slice_count(),
            "Starting slice exchange"
        );

        // The first slice goes out unasked to open the exchange.
        self.send_slice(&mut cursor, 0, request, &file_name, &descriptor)?;
        keepalive.arm();

        loop {
            tokio::select! {
                _ = keepalive.expired() => {
                    return Err(SessionError::Timeout(keepalive.period()));
                }
                event = inbound.recv() => {
                    match event {
                        Some(InboundEvent::SliceRequest(index)) => {
                            self.send_slice(&mut cursor, index, request, &file_name, &descriptor)?;
                            keepalive.arm();

                            if let Some(percent) = cursor.progress_for(index) {
                                if percent >= progress {
                                    progress = percent;
                                    let _ = updates.send(SessionStatus::Uploading {
                                        file_name: file_name.clone(),
                                        progress,
                                        has_progress: true,
                                    });
                                }
                            }
                        }
                        Some(InboundEvent::TransferEnd(url)) => {
                            keepalive.clear();
                            listeners.teardown();
                            return self.finish(request, &file_name, &url, updates).await;
                        }
                        Some(InboundEvent::TransferError(detail)) => {
                            return Err(SessionError::ServerRejectedUpload(detail));
                        }
                        Some(InboundEvent::Malformed { event, error }) => {
                            return Err(SessionError::ServerRejectedUpload(format!(
                                "malformed {event} payload: {error}"
                            )));
                        }
                        Some(InboundEvent::Disconnect) | None => {
                            return Err(SessionError::Disconnected);
                        }
                    }
                }
            }
        }
    }

    async fn ensure_connected(&self) -> SessionResult<()> {
        if self.channel.is_connected() {
            return Ok(());
        }

        info!(session = %self.id, "Realtime channel down, trying to connect");
        self.channel.connect();
        tokio::time::sleep(self.config.connect_grace).await;

        if self.channel.is_connected() {
            Ok(())
        } else {
            Err(SessionError::NoChannel(self.config.connect_grace))
        }
    }

    fn send_slice(
        &self,
        cursor: &mut SliceCursor,
        index: u64,
        request: &UploadRequest,
        file_name: &str,
        descriptor: &SourceDescriptor,
    ) -> SessionResult<()> {
        self.machine.transition(SessionEvent::SliceSent { index })?;

        let slice = cursor.take(index);
        let sent = slice.data.len();
        let payload = SlicePayload {
            is_private: request.is_private,
            name: file_name.to_string(),
            mime_type: descriptor.mime_type.clone(),
            size: descriptor.size,
            data: slice.data,
        };

        self.channel.emit(events::SLICE_SEND, payload.into_value());
        metrics::record_slice_sent(sent);
        Ok(())
    }

    async fn finish(
        &self,
        request: &UploadRequest,
        file_name: &str,
        url: &str,
        updates: &mpsc::UnboundedSender<SessionStatus>,
    ) -> SessionResult<Finished> {
        self.machine.transition(SessionEvent::TransferEnded)?;
        let _ = updates.send(SessionStatus::Uploading {
            file_name: file_name.to_string(),
            progress: 100,
            has_progress: true,
        });

        let file_url = strip_public_prefix(url, &self.config.public_prefix);
        let finalize = FinalizeRequest::for_request(request, &file_url, &self.config.default_folder);

        match self.remote.finalize_metadata(&finalize).await {
            Ok(mut resource) => {
                if resource.file_url.is_empty() {
                    resource.file_url = file_url;
                }
                request.apply_binding(&resource.file_url);
                Ok(Finished::Completed(resource))
            }
            Err(e) => Ok(Finished::DetailError(DetailError {
                resource_url: file_url,
                detail: e.to_string(),
            })),
        }
    }
}

/// `/public/files/a.png` → `/files/a.png`; anything else is left alone.
pub fn strip_public_prefix(url: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        return url.to_string();
    }
    match url.strip_prefix(prefix) {
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ConnectBehavior, MemoryChannel};
    use crate::remote::{MemoryRemote, Reply};
    use crate::session::FailureReason;
    use crate::source::SourceCapabilities;
    use serde_json::json;
    use std::time::Duration;

    fn session(channel: Arc<MemoryChannel>, remote: Arc<MemoryRemote>) -> UploadSession {
        UploadSession::new(
            channel,
            remote,
            SourceResolver::new(SourceCapabilities::default(), "file1"),
            Arc::new(UploaderConfig::default()),
        )
    }

    fn request(data: &'static [u8]) -> Arc<UploadRequest> {
        Arc::new(
            UploadRequest::builder()
                .bytes(data)
                .target_name("sample.txt")
                .build()
                .unwrap(),
        )
    }

    async fn drain(handle: &mut SessionHandle) -> Vec<SessionStatus> {
        let mut seen = Vec::new();
        while let Some(status) = handle.next().await {
            seen.push(status);
        }
        seen
    }

    #[test]
    fn test_strip_public_prefix() {
        assert_eq!(strip_public_prefix("/public/files/a.png", "/public"), "/files/a.png");
        assert_eq!(strip_public_prefix("/files/a.png", "/public"), "/files/a.png");
        assert_eq!(strip_public_prefix("/publicity/a.png", "/public"), "/publicity/a.png");
        assert_eq!(strip_public_prefix("/public/files/a.png", ""), "/public/files/a.png");
    }

    #[tokio::test]
    async fn test_small_file_completes() {
        let channel = Arc::new(MemoryChannel::connected());
        let remote = Arc::new(MemoryRemote::new());
        let mut outbound = channel.outbound();

        let mut handle = session(channel.clone(), remote.clone()).start(request(b"hello realtime upload world"));

        let first = outbound.recv().await.unwrap();
        assert_eq!(first.event, events::SLICE_SEND);
        assert_eq!(first.payload["name"], "sample.txt");
        assert_eq!(first.payload["size"], 27);
        assert_eq!(first.payload["type"], "text/plain");
        assert_eq!(channel.total_listeners(), 4);

        channel.dispatch(events::TRANSFER_END, json!({"file_url": "/public/files/sample.txt"}));

        let statuses = drain(&mut handle).await;
        assert!(matches!(statuses[0], SessionStatus::Ready));
        assert!(matches!(
            statuses[1],
            SessionStatus::Uploading { progress: 100, has_progress: true, .. }
        ));
        match &statuses[2] {
            SessionStatus::Completed(resource) => assert_eq!(resource.file_url, "/files/sample.txt"),
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(statuses.len(), 3);
        assert_eq!(handle.state(), SessionState::Completed);
        assert_eq!(channel.total_listeners(), 0);
        assert_eq!(remote.finalized()[0].file_url, "/files/sample.txt");
    }

    #[tokio::test]
    async fn test_server_paced_progress() {
        let channel = Arc::new(MemoryChannel::connected());
        let remote = Arc::new(MemoryRemote::new());
        let mut outbound = channel.outbound();
        let data: &'static [u8] = Box::leak(vec![7u8; 100_000].into_boxed_slice());

        let mut handle = session(channel.clone(), remote).start(request(data));
        outbound.recv().await.unwrap();

        for index in 1..=4u64 {
            channel.dispatch(events::SLICE_REQUEST, json!({ "currentSlice": index }));
            let sent = outbound.recv().await.unwrap();
            let expected = (100_000 - (index as usize * 24_576)).min(24_576);
            let decoded = base64::Engine::decode(
                &base64::engine::general_purpose::STANDARD,
                sent.payload["data"].as_str().unwrap(),
            )
            .unwrap();
            assert_eq!(decoded.len(), expected);
        }
        channel.dispatch(events::TRANSFER_END, json!({"file_url": "/files/blob"}));

        let progress: Vec<u8> = drain(&mut handle)
            .await
            .into_iter()
            .filter_map(|s| match s {
                SessionStatus::Uploading { progress, .. } => Some(progress),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![25, 49, 74, 98, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_expiry_fails_with_timeout() {
        let channel = Arc::new(MemoryChannel::connected());
        let mut handle = session(channel.clone(), Arc::new(MemoryRemote::new())).start(request(b"abc"));

        let statuses = drain(&mut handle).await;
        match statuses.last() {
            Some(SessionStatus::Failed { error, source }) => {
                assert_eq!(error.reason(), FailureReason::Timeout);
                assert_eq!(source.as_ref().map(|d| d.size), Some(3));
            }
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(handle.state(), SessionState::Failed(FailureReason::Timeout));
        assert_eq!(channel.total_listeners(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_never_connects() {
        let channel = Arc::new(MemoryChannel::new(false, ConnectBehavior::Refuse));
        let mut handle = session(channel.clone(), Arc::new(MemoryRemote::new())).start(request(b"abc"));

        let statuses = drain(&mut handle).await;
        assert!(matches!(
            statuses.last(),
            Some(SessionStatus::Failed { error: SessionError::NoChannel(d), .. }) if *d == Duration::from_millis(3000)
        ));
        assert_eq!(channel.connect_attempts(), 1);
        assert!(channel.emitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_connect_within_grace() {
        let channel = Arc::new(MemoryChannel::new(false, ConnectBehavior::Succeed));
        let mut outbound = channel.outbound();
        let _handle = session(channel.clone(), Arc::new(MemoryRemote::new())).start(request(b"abc"));

        let first = outbound.recv().await.unwrap();
        assert_eq!(first.event, events::SLICE_SEND);
        assert!(channel.is_connected());
    }

    #[tokio::test]
    async fn test_rejected_name_never_touches_channel() {
        let channel = Arc::new(MemoryChannel::connected());
        let remote = Arc::new(MemoryRemote::new());
        remote.set_validate(Reply::Reject("exists".into()));

        let mut handle = session(channel.clone(), remote).start(request(b"abc"));
        let statuses = drain(&mut handle).await;

        assert!(matches!(
            statuses.last(),
            Some(SessionStatus::Failed { error: SessionError::InvalidName(_), .. })
        ));
        assert!(channel.emitted().is_empty());
        assert_eq!(channel.total_listeners(), 0);
    }

    #[tokio::test]
    async fn test_validated_name_is_used_for_slices() {
        let channel = Arc::new(MemoryChannel::connected());
        let remote = Arc::new(MemoryRemote::new());
        remote.rename_to("sample (1).txt");
        let mut outbound = channel.outbound();

        let _handle = session(channel, remote).start(request(b"abc"));
        let first = outbound.recv().await.unwrap();
        assert_eq!(first.payload["name"], "sample (1).txt");
    }

    #[tokio::test]
    async fn test_server_error_and_disconnect() {
        for (event, reason) in [
            (events::TRANSFER_ERROR, FailureReason::ServerRejectedUpload),
            (events::DISCONNECT, FailureReason::Disconnected),
        ] {
            let channel = Arc::new(MemoryChannel::connected());
            let mut outbound = channel.outbound();
            let mut handle = session(channel.clone(), Arc::new(MemoryRemote::new())).start(request(b"abc"));

            outbound.recv().await.unwrap();
            channel.dispatch(event, json!({}));

            let statuses = drain(&mut handle).await;
            match statuses.last() {
                Some(SessionStatus::Failed { error, .. }) => assert_eq!(error.reason(), reason),
                other => panic!("unexpected status {other:?}"),
            }
            assert_eq!(channel.total_listeners(), 0);
        }
    }

    #[tokio::test]
    async fn test_finalize_failure_is_detail_error() {
        let channel = Arc::new(MemoryChannel::connected());
        let remote = Arc::new(MemoryRemote::new());
        remote.set_finalize(Reply::Reject("no such record".into()));
        let mut outbound = channel.outbound();

        let mut handle = session(channel.clone(), remote).start(request(b"abc"));
        outbound.recv().await.unwrap();
        channel.dispatch(events::TRANSFER_END, json!({"file_url": "/files/sample.txt"}));

        let statuses = drain(&mut handle).await;
        match statuses.last() {
            Some(SessionStatus::DetailError(detail)) => {
                assert_eq!(detail.resource_url, "/files/sample.txt");
                assert!(detail.detail.contains("no such record"));
            }
            other => panic!("unexpected status {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_destroy_sends_no_terminal_status() {
        let channel = Arc::new(MemoryChannel::connected());
        let mut outbound = channel.outbound();
        let mut handle = session(channel.clone(), Arc::new(MemoryRemote::new())).start(request(b"abc"));

        outbound.recv().await.unwrap();
        handle.destroy();

        let statuses = drain(&mut handle).await;
        assert!(statuses.iter().all(|s| !s.is_terminal()));
        assert_eq!(channel.total_listeners(), 0);
    }

    #[tokio::test]
    async fn test_sessions_sharing_a_lock_take_turns() {
        let channel = Arc::new(MemoryChannel::connected());
        let remote = Arc::new(MemoryRemote::new());
        let lock = Arc::new(Semaphore::new(1));
        let mut outbound = channel.outbound();

        let mut first = session(channel.clone(), remote.clone())
            .with_channel_lock(lock.clone())
            .start(request(b"first"));
        outbound.recv().await.unwrap();

        let mut second = session(channel.clone(), remote.clone())
            .with_channel_lock(lock.clone())
            .start(Arc::new(
                UploadRequest::builder()
                    .bytes(&b"second"[..])
                    .target_name("b.txt")
                    .build()
                    .unwrap(),
            ));
        assert!(matches!(second.next().await, Some(SessionStatus::Ready)));
        tokio::task::yield_now().await;
        assert_eq!(second.state(), SessionState::Negotiating);
        assert_eq!(channel.total_listeners(), 4);

        channel.dispatch(events::TRANSFER_END, json!({"file_url": "/files/sample.txt"}));
        assert!(matches!(drain(&mut first).await.last(), Some(SessionStatus::Completed(_))));

        let sent = outbound.recv().await.unwrap();
        assert_eq!(sent.payload["name"], "b.txt");
        channel.dispatch(events::TRANSFER_END, json!({"file_url": "/files/b.txt"}));
        match drain(&mut second).await.last() {
            Some(SessionStatus::Completed(resource)) => assert_eq!(resource.file_url, "/files/b.txt"),
            other => panic!("unexpected status {other:?}"),
        }
        assert_eq!(lock.available_permits(), 1);
    }
}
