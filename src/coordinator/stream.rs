use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use super::types::UploadStatus;

/// Statuses of one upload, ending right after the terminal one.
#[derive(Debug)]
pub struct StatusStream {
    id: String,
    rx: mpsc::UnboundedReceiver<UploadStatus>,
}

impl StatusStream {
    pub(crate) fn new(id: String, rx: mpsc::UnboundedReceiver<UploadStatus>) -> Self {
        Self { id, rx }
    }

    /// Identifier the coordinator tracks this upload under.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn next_status(&mut self) -> Option<UploadStatus> {
        self.rx.recv().await
    }

    /// Wait for the terminal status, discarding the rest.
    pub async fn finish(mut self) -> Option<UploadStatus> {
        let mut last = None;
        while let Some(status) = self.rx.recv().await {
            last = Some(status);
        }
        last.filter(UploadStatus::is_terminal)
    }
}

impl Stream for StatusStream {
    type Item = UploadStatus;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
