//! The shared Socket.IO event stream.
//!
//! One connection per process. Features register channel handlers on the
//! [`EventStream`] handle; the connection task decodes pushed events and
//! dispatches them. `connect` and `connect_error` are raised locally on
//! handshake success and on every transport failure.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::constants::{CHANNEL_CONNECT, CHANNEL_CONNECT_ERROR};
use crate::protocol::{
    decode_engine, decode_socket, encode_connect, encode_pong, EnginePacket, OpenInfo,
    SocketPacket, DEFAULT_NAMESPACE,
};

pub type HandlerId = u64;

type Handler = Arc<Mutex<Box<dyn FnMut(&Value) + Send>>>;

struct Entry {
    id: HandlerId,
    once: bool,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: HandlerId,
    channels: HashMap<String, Vec<Entry>>,
}

struct Shared {
    registry: Mutex<Registry>,
    connected: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn add(&self, channel: &str, once: bool, handler: Box<dyn FnMut(&Value) + Send>) -> HandlerId {
        let mut registry = self.registry();
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .channels
            .entry(channel.to_string())
            .or_default()
            .push(Entry {
                id,
                once,
                handler: Arc::new(Mutex::new(handler)),
            });
        id
    }

    fn remove(&self, channel: &str, id: HandlerId) -> bool {
        let mut registry = self.registry();
        let Some(entries) = registry.channels.get_mut(channel) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            registry.channels.remove(channel);
        }
        removed
    }

    /// Handlers run outside the registry lock so they may subscribe or
    /// unsubscribe themselves.
    fn dispatch(&self, channel: &str, data: &Value) {
        let handlers: Vec<Handler> = {
            let mut registry = self.registry();
            let Some(entries) = registry.channels.get_mut(channel) else {
                debug!(channel, "no handlers for stream event");
                return;
            };
            let handlers = entries
                .iter()
                .map(|entry| Arc::clone(&entry.handler))
                .collect();
            entries.retain(|entry| !entry.once);
            if entries.is_empty() {
                registry.channels.remove(channel);
            }
            handlers
        };

        for handler in handlers {
            let mut handler = handler
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            (handler)(data);
        }
    }
}

/// Cloneable handle to the process-wide stream connection.
#[derive(Clone)]
pub struct EventStream {
    shared: Arc<Shared>,
}

impl Default for EventStream {
    fn default() -> Self {
        Self::detached()
    }
}

impl EventStream {
    /// A handle with a handler registry but no connection task.
    pub fn detached() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
                connected: AtomicBool::new(false),
                shutdown,
            }),
        }
    }

    /// Opens the stream and keeps it open, reconnecting with backoff.
    pub fn connect(config: &Config) -> Self {
        let stream = Self::detached();
        let shared = Arc::clone(&stream.shared);
        let url = config.stream_url.clone();
        let backoff = (config.reconnect_min, config.reconnect_max);
        tokio::spawn(run_connection(shared, url, backoff));
        stream
    }

    pub fn subscribe<F>(&self, channel: &str, handler: F) -> HandlerId
    where
        F: FnMut(&Value) + Send + 'static,
    {
        self.shared.add(channel, false, Box::new(handler))
    }

    pub fn unsubscribe(&self, channel: &str, id: HandlerId) -> bool {
        self.shared.remove(channel, id)
    }

    /// Resolves with the next event on `channel`, then detaches.
    pub fn once(&self, channel: &str) -> OnceEvent {
        let (sender, receiver) = oneshot::channel();
        let mut sender = Some(sender);
        let id = self.shared.add(
            channel,
            true,
            Box::new(move |data: &Value| {
                if let Some(sender) = sender.take() {
                    let _ = sender.send(data.clone());
                }
            }),
        );
        OnceEvent {
            channel: channel.to_string(),
            id,
            receiver,
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn handler_count(&self, channel: &str) -> usize {
        self.shared
            .registry()
            .channels
            .get(channel)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Stops the connection task and drops every handler; pending
    /// [`OnceEvent`]s resolve to `None`.
    pub fn close(&self) {
        self.shared.shutdown.send_replace(true);
        self.shared.registry().channels.clear();
    }

    #[cfg(test)]
    pub(crate) fn emit_local(&self, channel: &str, data: &Value) {
        self.shared.dispatch(channel, data);
    }
}

/// One-shot wait on a channel. Dropping it unregisters the wait.
pub struct OnceEvent {
    channel: String,
    id: HandlerId,
    receiver: oneshot::Receiver<Value>,
    shared: Arc<Shared>,
}

impl Future for OnceEvent {
    type Output = Option<Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(Some(value)),
            Poll::Ready(Err(_)) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for OnceEvent {
    fn drop(&mut self) {
        self.shared.remove(&self.channel, self.id);
    }
}

async fn run_connection(shared: Arc<Shared>, url: Url, backoff: (Duration, Duration)) {
    let (min_backoff, max_backoff) = backoff;
    let mut delay = min_backoff;
    let mut shutdown = shared.shutdown.subscribe();

    loop {
        if *shutdown.borrow() {
            break;
        }
        match connect_and_listen(&shared, &url, &mut shutdown).await {
            Ok(()) => break,
            Err(err) => {
                if shared.connected.swap(false, Ordering::SeqCst) {
                    delay = min_backoff;
                }
                warn!(?err, retry_ms = delay.as_millis() as u64, "event stream unavailable");
                let payload = serde_json::json!({ "message": err.to_string() });
                shared.dispatch(CHANNEL_CONNECT_ERROR, &payload);
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
        delay = std::cmp::min(delay * 2, max_backoff);
    }

    shared.connected.store(false, Ordering::SeqCst);
    info!("event stream closed");
}

async fn connect_and_listen(
    shared: &Shared,
    url: &Url,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<()> {
    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .context("websocket connect failed")?;
    let (mut ws_sink, mut ws_stream) = ws_stream.split();
    debug!(%url, "event stream transport open");

    let mut liveness: Option<Duration> = None;

    loop {
        let next = async {
            match liveness {
                Some(window) => tokio::time::timeout(window, ws_stream.next())
                    .await
                    .map_err(|_| anyhow!("no ping from server within {:?}", window)),
                None => Ok(ws_stream.next().await),
            }
        };

        let message = tokio::select! {
            _ = shutdown.changed() => {
                let _ = ws_sink.send(Message::Close(None)).await;
                return Ok(());
            }
            message = next => message?,
        };

        let message = match message {
            Some(message) => message.context("websocket stream error")?,
            None => return Err(anyhow!("websocket stream ended")),
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Ping(payload) => {
                ws_sink
                    .send(Message::Pong(payload))
                    .await
                    .context("failed to respond to ping")?;
                continue;
            }
            Message::Close(frame) => return Err(anyhow!("websocket closed: {:?}", frame)),
            _ => continue,
        };

        let packet = match decode_engine(&text) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(?err, "failed to parse engine packet");
                continue;
            }
        };

        match packet {
            EnginePacket::Open(open) => {
                liveness = liveness_window(&open);
                debug!(sid = %open.sid, "engine handshake received");
                ws_sink
                    .send(Message::Text(encode_connect()))
                    .await
                    .context("socket connect request failed")?;
            }
            EnginePacket::Ping(payload) => {
                ws_sink
                    .send(Message::Text(encode_pong(&payload)))
                    .await
                    .context("failed to send pong")?;
            }
            EnginePacket::Message(body) => handle_socket_packet(shared, &body)?,
            EnginePacket::Close => return Err(anyhow!("server closed the engine session")),
            EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
        }
    }
}

/// Longest silence tolerated before the session counts as dead.
fn liveness_window(open: &OpenInfo) -> Option<Duration> {
    if open.ping_interval == 0 {
        return None;
    }
    Some(Duration::from_millis(
        open.ping_interval.saturating_add(open.ping_timeout),
    ))
}

fn handle_socket_packet(shared: &Shared, body: &str) -> Result<()> {
    let packet = match decode_socket(body) {
        Ok(packet) => packet,
        Err(err) => {
            warn!(?err, "failed to parse socket packet");
            return Ok(());
        }
    };

    match packet {
        SocketPacket::Connect { namespace, .. } if namespace == DEFAULT_NAMESPACE => {
            shared.connected.store(true, Ordering::SeqCst);
            info!("connected to event stream");
            shared.dispatch(CHANNEL_CONNECT, &Value::Null);
        }
        SocketPacket::ConnectError { data, .. } => {
            let message = data
                .as_ref()
                .and_then(|value| value.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("connection refused")
                .to_string();
            return Err(anyhow!("socket connect rejected: {}", message));
        }
        SocketPacket::Disconnect { namespace } if namespace == DEFAULT_NAMESPACE => {
            return Err(anyhow!("server disconnected the socket"));
        }
        SocketPacket::Event {
            namespace,
            name,
            data,
        } => {
            if namespace != DEFAULT_NAMESPACE {
                debug!(%namespace, %name, "ignoring event outside default namespace");
                return Ok(());
            }
            shared.dispatch(&name, &data);
        }
        SocketPacket::Binary => warn!("binary socket packets are not supported"),
        _ => {}
    }
    Ok(())
}
