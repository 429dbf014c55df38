//! Low-level Chrome DevTools Protocol (CDP) client over WebSocket.
//!
//! One duplex connection to a page target's debugging endpoint. Outgoing
//! commands are correlated with responses by numeric id; unsolicited frames
//! carrying only a method name are events and fan out to registered
//! listeners. Many callers may send concurrently over the one socket.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use webpilot_core::{Error, Result};

/// Recognized CDP event kinds, with a catch-all for everything this client
/// does not interpret itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    LoadEventFired,
    FrameNavigated,
    JavascriptDialogOpening,
    TargetCrashed,
    Other(String),
}

impl EventKind {
    pub fn from_method(method: &str) -> Self {
        match method {
            "Page.loadEventFired" => Self::LoadEventFired,
            "Page.frameNavigated" => Self::FrameNavigated,
            "Page.javascriptDialogOpening" => Self::JavascriptDialogOpening,
            "Inspector.targetCrashed" => Self::TargetCrashed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn method(&self) -> &str {
        match self {
            Self::LoadEventFired => "Page.loadEventFired",
            Self::FrameNavigated => "Page.frameNavigated",
            Self::JavascriptDialogOpening => "Page.javascriptDialogOpening",
            Self::TargetCrashed => "Inspector.targetCrashed",
            Self::Other(method) => method,
        }
    }
}

/// In-flight commands waiting for their matching response. Dropping a sender
/// resolves its waiter with a recv error, which `send` maps to
/// [`Error::ConnectionClosed`].
struct ConnectionState {
    closed: bool,
    pending: HashMap<u64, oneshot::Sender<Value>>,
}

struct Inner {
    outbound: mpsc::Sender<String>,
    next_id: AtomicU64,
    state: Mutex<ConnectionState>,
    listeners: Mutex<HashMap<EventKind, Vec<mpsc::Sender<Value>>>>,
    closed_flag: AtomicBool,
    command_timeout: Duration,
}

/// A CDP WebSocket connection that can send commands and receive
/// responses/events.
pub struct CdpConnection {
    inner: Arc<Inner>,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl CdpConnection {
    /// Connect to a target's CDP WebSocket endpoint.
    pub async fn connect(ws_url: &str, command_timeout: Duration) -> Result<Self> {
        let (ws_stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| Error::Transport(format!("connect to debug target failed: {e}")))?;
        let (mut ws_sink, mut ws_read) = ws_stream.split();

        let (outbound, mut outbound_rx) = mpsc::channel::<String>(256);

        let inner = Arc::new(Inner {
            outbound,
            next_id: AtomicU64::new(1),
            state: Mutex::new(ConnectionState {
                closed: false,
                pending: HashMap::new(),
            }),
            listeners: Mutex::new(HashMap::new()),
            closed_flag: AtomicBool::new(false),
            command_timeout,
        });

        // Writer task: owns the sink, forwards frames from the channel.
        let writer_handle = tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Text(text)).await {
                    warn!("CDP socket write failed: {e}");
                    break;
                }
            }
        });

        // Reader task: routes responses to waiters and events to listeners;
        // any read failure or remote close tears the connection down.
        let reader_inner = inner.clone();
        let reader_handle = tokio::spawn(async move {
            while let Some(frame) = ws_read.next().await {
                match frame {
                    Ok(Message::Text(text)) => dispatch_frame(&reader_inner, &text).await,
                    Ok(Message::Close(_)) => {
                        debug!("CDP socket closed by browser");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("CDP socket read failed: {e}");
                        break;
                    }
                }
            }
            shutdown(&reader_inner).await;
        });

        Ok(Self {
            inner,
            reader_handle,
            writer_handle,
        })
    }

    /// Send a command and wait for its matching response.
    ///
    /// A timed-out command is forgotten (its late response, if any, is
    /// dropped on arrival) but the connection stays open; only close tears
    /// everything down.
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = json!({
            "id": id,
            "method": method,
            "params": params,
        })
        .to_string();

        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.inner.state.lock().await;
            if state.closed {
                return Err(Error::ConnectionClosed);
            }
            state.pending.insert(id, tx);
        }

        if self.inner.outbound.send(frame).await.is_err() {
            self.inner.state.lock().await.pending.remove(&id);
            return Err(Error::ConnectionClosed);
        }

        match tokio::time::timeout(self.inner.command_timeout, rx).await {
            Ok(Ok(response)) => {
                if let Some(err) = response.get("error") {
                    let code = err.get("code").and_then(|v| v.as_i64()).unwrap_or(0);
                    let message = err
                        .get("message")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown");
                    return Err(Error::Transport(format!(
                        "{method} failed: {message} (code {code})"
                    )));
                }
                Ok(response.get("result").cloned().unwrap_or(Value::Null))
            }
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                self.inner.state.lock().await.pending.remove(&id);
                Err(Error::Timeout(format!(
                    "command {method} got no response within {:?}",
                    self.inner.command_timeout
                )))
            }
        }
    }

    /// Register a listener for one event kind. Listeners for a kind are
    /// notified in registration order; a listener whose receiver is gone is
    /// pruned on the next delivery.
    pub async fn subscribe(&self, kind: EventKind) -> mpsc::Receiver<Value> {
        let (tx, rx) = mpsc::channel(64);
        self.inner
            .listeners
            .lock()
            .await
            .entry(kind)
            .or_default()
            .push(tx);
        rx
    }

    /// Drop every listener registered for `kind`.
    pub async fn unsubscribe(&self, kind: &EventKind) {
        self.inner.listeners.lock().await.remove(kind);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed_flag.load(Ordering::SeqCst)
    }

    /// Close the connection: every outstanding command resolves to
    /// [`Error::ConnectionClosed`], every listener is dropped, and later
    /// `send` calls fail fast. Idempotent.
    pub async fn close(&self) {
        shutdown(&self.inner).await;
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}

async fn dispatch_frame(inner: &Arc<Inner>, text: &str) {
    let frame: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!("dropping unparseable CDP frame: {e}");
            return;
        }
    };

    if let Some(id) = frame.get("id").and_then(|v| v.as_u64()) {
        let waiter = inner.state.lock().await.pending.remove(&id);
        match waiter {
            // The waiter may have timed out and forgotten the id already.
            Some(tx) => {
                let _ = tx.send(frame);
            }
            None => debug!(id, "response for a forgotten command"),
        }
        return;
    }

    if let Some(method) = frame.get("method").and_then(|v| v.as_str()) {
        let kind = EventKind::from_method(method);
        let params = frame.get("params").cloned().unwrap_or(Value::Null);
        let mut listeners = inner.listeners.lock().await;
        if let Some(senders) = listeners.get_mut(&kind) {
            for tx in senders.iter() {
                let _ = tx.try_send(params.clone());
            }
            senders.retain(|tx| !tx.is_closed());
        }
        return;
    }

    warn!("dropping CDP frame with neither id nor method");
}

/// Marks the connection closed and fails everything in flight. The closed
/// flag and the pending drain happen under one lock so no concurrent `send`
/// can register between them.
async fn shutdown(inner: &Arc<Inner>) {
    let drained = {
        let mut state = inner.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        inner.closed_flag.store(true, Ordering::SeqCst);
        std::mem::take(&mut state.pending)
    };
    let in_flight = drained.len();
    drop(drained);
    inner.listeners.lock().await.clear();
    debug!(in_flight, "CDP connection closed");
}
