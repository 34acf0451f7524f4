use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit};

use super::types::InboundEvent;
use crate::channel::{events, EventHandler, RealtimeChannel, SliceRequest, SubscriptionId, TransferEnd};

/// The channel subscriptions one session owns.
///
/// Handlers only forward into the session's queue; all decisions happen on
/// the session task. [`teardown`](Self::teardown) may be called any number of
/// times and also runs on drop.
///
/// While a channel permit is held no other session sharing the channel can
/// subscribe. It is released only after the listeners are gone.
pub(crate) struct ChannelSubscriptions {
    channel: Arc<dyn RealtimeChannel>,
    ids: Vec<SubscriptionId>,
    exclusive: Option<OwnedSemaphorePermit>,
}

impl ChannelSubscriptions {
    pub fn new(channel: Arc<dyn RealtimeChannel>) -> Self {
        Self {
            channel,
            ids: Vec::new(),
            exclusive: None,
        }
    }

    /// Keep `permit` until teardown.
    pub fn hold(&mut self, permit: OwnedSemaphorePermit) {
        self.exclusive = Some(permit);
    }

    /// Register the four transfer listeners.
    pub fn subscribe_all(&mut self) -> mpsc::UnboundedReceiver<InboundEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        self.forward(events::SLICE_REQUEST, tx.clone(), |value| {
            match serde_json::from_value::<SliceRequest>(value) {
                Ok(request) => InboundEvent::SliceRequest(request.current_slice),
                Err(e) => InboundEvent::Malformed {
                    event: events::SLICE_REQUEST,
                    error: e.to_string(),
                },
            }
        });
        self.forward(events::TRANSFER_END, tx.clone(), |value| {
            match serde_json::from_value::<TransferEnd>(value) {
                Ok(end) => InboundEvent::TransferEnd(end.file_url),
                Err(e) => InboundEvent::Malformed {
                    event: events::TRANSFER_END,
                    error: e.to_string(),
                },
            }
        });
        self.forward(events::TRANSFER_ERROR, tx.clone(), |value| {
            InboundEvent::TransferError(error_detail(&value))
        });
        self.forward(events::DISCONNECT, tx, |_| InboundEvent::Disconnect);

        rx
    }

    fn forward<F>(&mut self, event: &str, tx: mpsc::UnboundedSender<InboundEvent>, map: F)
    where
        F: Fn(Value) -> InboundEvent + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(move |value: Value| {
            // The session may already be gone; late events are dropped.
            let _ = tx.send(map(value));
        });
        self.ids.push(self.channel.on(event, handler));
    }

    #[cfg(test)]
    pub fn active(&self) -> usize {
        self.ids.len()
    }

    #[cfg(test)]
    pub fn is_exclusive(&self) -> bool {
        self.exclusive.is_some()
    }

    /// Remove every listener this session registered. Returns how many were
    /// removed by this call.
    pub fn teardown(&mut self) -> usize {
        let mut removed = 0;
        for id in self.ids.drain(..) {
            if self.channel.off(id) {
                removed += 1;
            }
        }
        self.exclusive.take();
        removed
    }
}

impl Drop for ChannelSubscriptions {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn error_detail(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| "upload-error event".to_string()),
        _ => "upload-error event".to_string(),
    }
}
