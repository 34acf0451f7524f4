use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{EventHandler, SubscriptionId};

/// Event-name → handlers table shared by the channel implementations.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: DashMap<String, Vec<(SubscriptionId, EventHandler)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, event: &str, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    pub fn off(&self, subscription: SubscriptionId) -> bool {
        let mut removed = false;
        for mut entry in self.listeners.iter_mut() {
            let before = entry.len();
            entry.retain(|(id, _)| *id != subscription);
            if entry.len() != before {
                removed = true;
                break;
            }
        }
        removed
    }

    /// Call every handler registered for `event`. Returns how many ran.
    pub fn dispatch(&self, event: &str, payload: Value) -> usize {
        // Clone out so handlers may call on/off without deadlocking the shard.
        let handlers: Vec<EventHandler> = match self.listeners.get(event) {
            Some(entry) => entry.iter().map(|(_, h)| h.clone()).collect(),
            None => return 0,
        };

        for handler in &handlers {
            handler(payload.clone());
        }
        handlers.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map(|e| e.len()).unwrap_or(0)
    }

    pub fn total_listeners(&self) -> usize {
        self.listeners.iter().map(|e| e.len()).sum()
    }

    pub fn clear(&self) {
        self.listeners.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_on_dispatch_off() {
        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let id = registry.on("ping", Arc::new(move |v: Value| sink.lock().push(v)));

        assert_eq!(registry.dispatch("ping", json!(1)), 1);
        assert!(registry.off(id));
        assert_eq!(registry.dispatch("ping", json!(2)), 0);

        assert_eq!(*seen.lock(), vec![json!(1)]);
    }

    #[test]
    fn test_off_removes_only_that_handler() {
        let registry = ListenerRegistry::new();
        let a = registry.on("evt", Arc::new(|_: Value| {}));
        let _b = registry.on("evt", Arc::new(|_: Value| {}));

        assert!(registry.off(a));
        assert!(!registry.off(a));
        assert_eq!(registry.listener_count("evt"), 1);
    }

    #[test]
    fn test_handler_can_unsubscribe_itself() {
        let registry = Arc::new(ListenerRegistry::new());
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let reg = registry.clone();
        let own = slot.clone();
        let id = registry.on(
            "once",
            Arc::new(move |_: Value| {
                if let Some(id) = own.lock().take() {
                    reg.off(id);
                }
            }),
        );
        *slot.lock() = Some(id);

        registry.dispatch("once", Value::Null);
        assert_eq!(registry.total_listeners(), 0);
    }
}
