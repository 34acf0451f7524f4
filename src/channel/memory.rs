use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;

use super::facade::RealtimeChannel;
use super::registry::ListenerRegistry;
use super::types::{events, EventHandler, SubscriptionId};

/// What `connect()` does on a [`MemoryChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Becomes connected immediately.
    Succeed,
    /// Stays disconnected.
    Refuse,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
    pub event: String,
    pub payload: Value,
}

/// In-process channel. The owner plays the server: it reads emitted events
/// from [`outbound`](MemoryChannel::outbound) and answers with
/// [`dispatch`](MemoryChannel::dispatch).
pub struct MemoryChannel {
    connected: AtomicBool,
    behavior: Mutex<ConnectBehavior>,
    connect_attempts: AtomicUsize,
    registry: ListenerRegistry,
    emitted: Mutex<Vec<EmittedEvent>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<EmittedEvent>>>,
}

impl MemoryChannel {
    pub fn connected() -> Self {
        Self::new(true, ConnectBehavior::Succeed)
    }

    pub fn new(connected: bool, behavior: ConnectBehavior) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            behavior: Mutex::new(behavior),
            connect_attempts: AtomicUsize::new(0),
            registry: ListenerRegistry::new(),
            emitted: Mutex::new(Vec::new()),
            outbound: Mutex::new(None),
        }
    }

    /// Stream of everything emitted from now on. Replaces any earlier tap.
    pub fn outbound(&self) -> mpsc::UnboundedReceiver<EmittedEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.outbound.lock() = Some(tx);
        rx
    }

    /// Deliver an inbound event to the registered handlers.
    pub fn dispatch(&self, event: &str, payload: Value) -> usize {
        self.registry.dispatch(event, payload)
    }

    /// Drop the connection and tell listeners about it.
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.registry
            .dispatch(events::DISCONNECT, Value::Object(Default::default()));
    }

    pub fn set_connect_behavior(&self, behavior: ConnectBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn emitted(&self) -> Vec<EmittedEvent> {
        self.emitted.lock().clone()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.registry.listener_count(event)
    }

    pub fn total_listeners(&self) -> usize {
        self.registry.total_listeners()
    }
}

impl RealtimeChannel for MemoryChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connect(&self) {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if *self.behavior.lock() == ConnectBehavior::Succeed {
            self.connected.store(true, Ordering::SeqCst);
        }
    }

    fn emit(&self, event: &str, payload: Value) {
        let emitted = EmittedEvent {
            event: event.to_string(),
            payload,
        };
        self.emitted.lock().push(emitted.clone());
        if let Some(tx) = self.outbound.lock().as_ref() {
            let _ = tx.send(emitted);
        }
    }

    fn on(&self, event: &str, handler: EventHandler) -> SubscriptionId {
        self.registry.on(event, handler)
    }

    fn off(&self, subscription: SubscriptionId) -> bool {
        self.registry.off(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_refused_connect_stays_disconnected() {
        let channel = MemoryChannel::new(false, ConnectBehavior::Refuse);
        channel.connect();
        assert!(!channel.is_connected());
        assert_eq!(channel.connect_attempts(), 1);

        channel.set_connect_behavior(ConnectBehavior::Succeed);
        channel.connect();
        assert!(channel.is_connected());
    }

    #[tokio::test]
    async fn test_emit_is_tapped() {
        let channel = MemoryChannel::connected();
        let mut outbound = channel.outbound();

        channel.emit("hello", json!({"n": 1}));

        let event = outbound.recv().await.unwrap();
        assert_eq!(event.event, "hello");
        assert_eq!(channel.emitted().len(), 1);
    }

    #[test]
    fn test_drop_connection_notifies() {
        let channel = MemoryChannel::connected();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        channel.on(
            events::DISCONNECT,
            Arc::new(move |_: Value| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        channel.drop_connection();
        assert!(!channel.is_connected());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
