//! WebSocket transport for the channel facade.
//!
//! Frames are JSON text messages shaped like [`ChannelFrame`]. When the
//! socket ends for any reason a `disconnect` event is dispatched locally.

use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::error::ChannelResult;
use super::facade::RealtimeChannel;
use super::registry::ListenerRegistry;
use super::types::{events, ChannelFrame, EventHandler, SubscriptionId};

const WRITE_QUEUE_DEPTH: usize = 256;

pub struct WsChannel {
    inner: Arc<WsInner>,
}

struct WsInner {
    url: String,
    connected: AtomicBool,
    connecting: AtomicBool,
    registry: ListenerRegistry,
    write_tx: Mutex<Option<mpsc::Sender<Message>>>,
    cancel: CancellationToken,
}

impl WsChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(WsInner {
                url: url.into(),
                connected: AtomicBool::new(false),
                connecting: AtomicBool::new(false),
                registry: ListenerRegistry::new(),
                write_tx: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Close the socket. Listeners receive a `disconnect` event.
    pub fn close(&self) {
        self.inner.cancel.cancel();
    }
}

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl RealtimeChannel for WsChannel {
    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn connect(&self) {
        if self.inner.cancel.is_cancelled()
            || self.inner.connected.load(Ordering::SeqCst)
            || self.inner.connecting.swap(true, Ordering::SeqCst)
        {
            return;
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(url = %self.inner.url, "No async runtime, cannot connect channel");
                self.inner.connecting.store(false, Ordering::SeqCst);
                return;
            }
        };

        let inner = self.inner.clone();
        runtime.spawn(async move { inner.run().await });
    }

    fn emit(&self, event: &str, payload: Value) {
        let frame = ChannelFrame {
            event: event.to_string(),
            data: payload,
        };
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                warn!(event, "Failed to encode frame: {e}");
                return;
            }
        };

        let tx = self.inner.write_tx.lock().clone();
        match tx {
            Some(tx) => {
                if let Err(e) = tx.try_send(Message::Text(text)) {
                    warn!(event, "Dropping outbound frame: {e}");
                }
            }
            None => debug!(event, "Channel not connected, frame dropped"),
        }
    }

    fn on(&self, event: &str, handler: EventHandler) -> SubscriptionId {
        self.inner.registry.on(event, handler)
    }

    fn off(&self, subscription: SubscriptionId) -> bool {
        self.inner.registry.off(subscription)
    }
}

impl WsInner {
    async fn run(self: Arc<Self>) {
        let stream = match tokio_tungstenite::connect_async(self.url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!(url = %self.url, "WebSocket connect failed: {e}");
                self.connecting.store(false, Ordering::SeqCst);
                return;
            }
        };

        let (write, read) = stream.split();
        let (write_tx, write_rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        *self.write_tx.lock() = Some(write_tx);
        self.connected.store(true, Ordering::SeqCst);
        self.connecting.store(false, Ordering::SeqCst);
        info!(url = %self.url, "Realtime channel connected");

        let cancel = self.cancel.child_token();
        let writer = tokio::spawn(write_pump(write, write_rx, cancel.clone()));
        read_pump(read, &self.registry, cancel.clone()).await;
        cancel.cancel();
        let _ = writer.await;

        self.write_tx.lock().take();
        self.connected.store(false, Ordering::SeqCst);
        info!(url = %self.url, "Realtime channel disconnected");
        self.registry.dispatch(events::DISCONNECT, json!({}));
    }
}

pub(crate) fn decode_frame(text: &str) -> ChannelResult<ChannelFrame> {
    Ok(serde_json::from_str(text)?)
}

async fn read_pump<S>(mut read: S, registry: &ListenerRegistry, cancel: CancellationToken)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match decode_frame(&text) {
                        Ok(frame) => {
                            trace!(event = %frame.event, "Inbound frame");
                            registry.dispatch(&frame.event, frame.data);
                        }
                        Err(e) => warn!("Ignoring frame: {e}"),
                    },
                    Some(Ok(Message::Close(_))) => {
                        debug!("Received close frame");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}

async fn write_pump<S>(mut write: S, mut write_rx: mpsc::Receiver<Message>, cancel: CancellationToken)
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                match msg {
                    Some(m) => {
                        if let Err(e) = write.send(m).await {
                            warn!("WebSocket write error: {e}");
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let _ = write.send(Message::Close(None)).await;
}
