use serde_json::Value;

use super::types::{EventHandler, SubscriptionId};

/// Minimal surface of an event-based realtime transport.
///
/// Implementations are process-wide and shared; they do no retrying or
/// backoff of their own.
pub trait RealtimeChannel: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Start connecting in the background. Callers poll [`is_connected`]
    /// to learn the outcome.
    ///
    /// [`is_connected`]: RealtimeChannel::is_connected
    fn connect(&self);

    /// Fire-and-forget send.
    fn emit(&self, event: &str, payload: Value);

    /// Register `handler` for `event`. The returned id removes exactly this
    /// handler when passed to [`off`](RealtimeChannel::off).
    fn on(&self, event: &str, handler: EventHandler) -> SubscriptionId;

    /// Remove a handler. Returns false if it was already gone.
    fn off(&self, subscription: SubscriptionId) -> bool;
}
