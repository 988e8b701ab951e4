//! WebSocket RPC client for the sidecar.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    anyhow::Context,
    async_trait::async_trait,
    futures::{SinkExt, StreamExt},
    serde_json::Value,
    tokio::sync::{Mutex, mpsc, oneshot},
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
};

use crate::types::{MEDIA_EXPIRED_CODE, RequestFrame, SidecarCall, SidecarMessage};

pub const DEFAULT_SIDECAR_PORT: u16 = 9121;

/// Invoked for every unsolicited sidecar frame (everything but responses).
pub type MessageCallback = Arc<dyn Fn(SidecarMessage) + Send + Sync>;

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<CallOutcome>>>>;

#[derive(Debug)]
struct CallOutcome {
    ok: bool,
    result: Option<Value>,
    error: Option<String>,
    code: Option<String>,
}

/// Request/response calls against the sidecar on behalf of a session.
#[async_trait]
pub trait SidecarRpc: Send + Sync {
    async fn call(&self, session_id: &str, call: SidecarCall) -> courier_session::Result<Value>;
}

/// Live connection to the sidecar, correlating responses by request id.
pub struct SidecarHandle {
    write_tx: mpsc::UnboundedSender<String>,
    pending: PendingMap,
    connected: Arc<AtomicBool>,
    timeout: Duration,
}

impl SidecarHandle {
    /// Build a handle over an outgoing frame channel. The caller owns the
    /// transport and feeds incoming frames to the returned [`FrameRouter`].
    pub fn new(
        write_tx: mpsc::UnboundedSender<String>,
        callback: MessageCallback,
        timeout: Duration,
    ) -> (Self, FrameRouter) {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let router = FrameRouter {
            pending: Arc::clone(&pending),
            connected: Arc::clone(&connected),
            callback,
        };
        (
            Self {
                write_tx,
                pending,
                connected,
                timeout,
            },
            router,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire) && !self.write_tx.is_closed()
    }
}

#[async_trait]
impl SidecarRpc for SidecarHandle {
    async fn call(&self, session_id: &str, call: SidecarCall) -> courier_session::Result<Value> {
        if !self.is_connected() {
            return Err(courier_session::Error::unavailable(
                "not connected to whatsapp sidecar",
            ));
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        let frame = serde_json::to_string(&RequestFrame::new(&request_id, session_id, &call))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.clone(), tx);

        if self.write_tx.send(frame).is_err() {
            self.pending.lock().await.remove(&request_id);
            return Err(courier_session::Error::unavailable(
                "whatsapp sidecar connection closed",
            ));
        }
        debug!(session_id, request_id, method = call.method(), "sidecar call");

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(outcome)) => into_result(outcome),
            Ok(Err(_)) => Err(courier_session::Error::unavailable(
                "whatsapp sidecar connection closed during call",
            )),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(courier_session::Error::timeout(call.method()))
            },
        }
    }
}

fn into_result(outcome: CallOutcome) -> courier_session::Result<Value> {
    if outcome.ok {
        return Ok(outcome.result.unwrap_or(Value::Null));
    }
    let message = outcome
        .error
        .unwrap_or_else(|| "unknown sidecar error".into());
    match outcome.code.as_deref() {
        Some(MEDIA_EXPIRED_CODE) => Err(courier_session::Error::media_expired(message)),
        _ => Err(courier_session::Error::remote(outcome.code, message)),
    }
}

/// Routes incoming frames: responses to their waiting caller, everything
/// else to the callback.
pub struct FrameRouter {
    pending: PendingMap,
    connected: Arc<AtomicBool>,
    callback: MessageCallback,
}

impl FrameRouter {
    pub async fn route(&self, text: &str) {
        let msg = match serde_json::from_str::<SidecarMessage>(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "ignoring unparseable sidecar frame");
                return;
            },
        };
        match msg {
            SidecarMessage::Response {
                request_id,
                ok,
                result,
                error,
                code,
            } => {
                let waiter = self.pending.lock().await.remove(&request_id);
                match waiter {
                    // The caller may have timed out and dropped the receiver.
                    Some(tx) => {
                        let _ = tx.send(CallOutcome {
                            ok,
                            result,
                            error,
                            code,
                        });
                    },
                    None => debug!(request_id, "response for unknown request"),
                }
            },
            other => (self.callback)(other),
        }
    }

    /// Mark the connection closed and fail every in-flight call.
    pub async fn close(&self) {
        self.connected.store(false, Ordering::Release);
        self.pending.lock().await.clear();
    }
}

/// Connect to the sidecar on `127.0.0.1:port`.
pub async fn connect(
    port: u16,
    callback: MessageCallback,
    timeout: Duration,
) -> anyhow::Result<SidecarHandle> {
    let url = format!("ws://127.0.0.1:{port}");
    let (ws_stream, _response) = connect_async(url.as_str())
        .await
        .with_context(|| format!("failed to connect to whatsapp sidecar at {url}"))?;
    info!(url = %url, "connected to whatsapp sidecar");

    let (mut ws_sink, mut ws_reader) = ws_stream.split();
    let (write_tx, mut write_rx) = mpsc::unbounded_channel::<String>();
    let (handle, router) = SidecarHandle::new(write_tx, callback, timeout);

    tokio::spawn(async move {
        while let Some(frame) = write_rx.recv().await {
            if let Err(e) = ws_sink.send(Message::Text(frame.into())).await {
                warn!(error = %e, "failed to write to whatsapp sidecar");
                break;
            }
        }
    });

    tokio::spawn(async move {
        while let Some(msg) = ws_reader.next().await {
            match msg {
                Ok(Message::Text(text)) => router.route(text.as_str()).await,
                Ok(Message::Close(_)) => break,
                Ok(_) => {},
                Err(e) => {
                    warn!(error = %e, "whatsapp sidecar connection error");
                    break;
                },
            }
        }
        info!("whatsapp sidecar connection closed");
        router.close().await;
    });

    Ok(handle)
}

/// [`connect`] with linear backoff, for a sidecar that may still be starting.
pub async fn connect_with_retry(
    port: u16,
    callback: MessageCallback,
    timeout: Duration,
    attempts: u32,
) -> anyhow::Result<SidecarHandle> {
    let attempts = attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match connect(port, Arc::clone(&callback), timeout).await {
            Ok(handle) => return Ok(handle),
            Err(e) => {
                debug!(attempt, error = %e, "sidecar not reachable yet");
                last_err = Some(e);
                if let Some(delay) = retry_delay(attempt, attempts) {
                    tokio::time::sleep(delay).await;
                }
            },
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("could not connect to whatsapp sidecar")))
}

/// Pause after failed `attempt`; `None` once no attempt is left.
fn retry_delay(attempt: u32, attempts: u32) -> Option<Duration> {
    (attempt < attempts).then(|| Duration::from_millis(500 * u64::from(attempt)))
}
