//! Realtime channel facade.
//!
//! The upload session only ever talks to the transport through
//! [`RealtimeChannel`]. Two implementations are provided: an in-process
//! [`MemoryChannel`] and a WebSocket-backed [`WsChannel`].

pub mod error;
pub mod facade;
pub mod memory;
pub mod registry;
pub mod types;
pub mod websocket;

pub use error::{ChannelError, ChannelResult};
pub use facade::RealtimeChannel;
pub use memory::{ConnectBehavior, EmittedEvent, MemoryChannel};
pub use registry::ListenerRegistry;
pub use types::{events, ChannelFrame, EventHandler, SlicePayload, SliceRequest, SubscriptionId, TransferEnd};
pub use websocket::WsChannel;
