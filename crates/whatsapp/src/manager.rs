//! Session lifecycle on top of a shared sidecar connection.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, RwLock as StdRwLock},
    time::Duration,
};

use {
    anyhow::{Result, bail},
    courier_session::{EventSink, LifecycleEvent, SessionRegistry, topics},
    courier_store::{MessageStore, NewMessage},
    serde_json::{Value, json},
    tokio::sync::{Mutex, RwLock, mpsc},
    tracing::{debug, info, warn},
};

use crate::{
    process::{SidecarConfig, SidecarProcess, find_sidecar_dir, start_sidecar},
    session::SidecarSession,
    sidecar::{
        DEFAULT_SIDECAR_PORT, MessageCallback, SidecarHandle, SidecarRpc, connect_with_retry,
    },
    types::{ConnectionState, SidecarCall, SidecarMessage},
};

const CONNECT_ATTEMPTS: u32 = 10;

type StateMap = Arc<StdRwLock<HashMap<String, ConnectionState>>>;

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub sidecar_port: u16,
    pub sidecar_dir: Option<PathBuf>,
    /// Credentials live in `<auth_dir>/<session_id>`.
    pub auth_dir: Option<PathBuf>,
    /// Spawn and supervise the sidecar process; otherwise connect to one
    /// that is already running.
    pub auto_start: bool,
    pub request_timeout: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            sidecar_port: DEFAULT_SIDECAR_PORT,
            sidecar_dir: None,
            auth_dir: None,
            auto_start: true,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Starts and stops WhatsApp sessions and keeps the [`SessionRegistry`] in
/// step with what the sidecar reports.
pub struct WhatsAppManager {
    options: ManagerOptions,
    sessions: Arc<SessionRegistry>,
    handler: Arc<SidecarEventHandler>,
    sidecar: RwLock<Option<Arc<SidecarHandle>>>,
    sidecar_process: Mutex<Option<SidecarProcess>>,
}

impl WhatsAppManager {
    pub fn new(
        options: ManagerOptions,
        sessions: Arc<SessionRegistry>,
        store: Arc<dyn MessageStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let handler = Arc::new(SidecarEventHandler::new(
            Arc::clone(&sessions),
            store,
            events,
        ));
        Self {
            options,
            sessions,
            handler,
            sidecar: RwLock::new(None),
            sidecar_process: Mutex::new(None),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Callback for sidecar events. Events are handled in arrival order on a
    /// dedicated task. Must be called inside a tokio runtime.
    pub fn message_callback(&self) -> MessageCallback {
        let (tx, mut rx) = mpsc::unbounded_channel::<SidecarMessage>();
        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                handler.handle(msg).await;
            }
        });
        Arc::new(move |msg| {
            if tx.send(msg).is_err() {
                warn!("sidecar event handler is gone, dropping event");
            }
        })
    }

    /// Use an established connection instead of connecting on demand.
    pub async fn attach(&self, handle: SidecarHandle) {
        *self.sidecar.write().await = Some(Arc::new(handle));
    }

    async fn ensure_connected(&self) -> Result<Arc<SidecarHandle>> {
        if let Some(handle) = self.sidecar.read().await.as_ref()
            && handle.is_connected()
        {
            return Ok(Arc::clone(handle));
        }

        if self.options.auto_start {
            self.ensure_process_running().await?;
        }

        let mut sidecar = self.sidecar.write().await;
        if let Some(handle) = sidecar.as_ref()
            && handle.is_connected()
        {
            return Ok(Arc::clone(handle));
        }

        let handle = Arc::new(
            connect_with_retry(
                self.options.sidecar_port,
                self.message_callback(),
                self.options.request_timeout,
                CONNECT_ATTEMPTS,
            )
            .await?,
        );
        *sidecar = Some(Arc::clone(&handle));
        Ok(handle)
    }

    async fn ensure_process_running(&self) -> Result<()> {
        let mut process = self.sidecar_process.lock().await;
        if let Some(proc) = process.as_mut() {
            if proc.is_running() {
                return Ok(());
            }
            warn!("whatsapp sidecar died, restarting");
        }

        let config = SidecarConfig {
            sidecar_dir: find_sidecar_dir(self.options.sidecar_dir.as_deref())?,
            port: self.options.sidecar_port,
            auth_dir: self.options.auth_dir.clone(),
        };
        *process = Some(start_sidecar(config).await?);
        Ok(())
    }

    /// Log a session in and register it. The QR code (or the connected
    /// notification for stored credentials) arrives later as an event.
    pub async fn start_session(&self, session_id: &str) -> Result<()> {
        if session_id.trim().is_empty() {
            bail!("session id must not be empty");
        }
        let handle = self.ensure_connected().await?;

        self.handler
            .set_state(session_id, ConnectionState::Disconnected);

        let auth_dir = self
            .options
            .auth_dir
            .as_ref()
            .map(|dir| dir.join(session_id).to_string_lossy().into_owned());
        if let Err(e) = handle
            .call(session_id, SidecarCall::Login { auth_dir })
            .await
        {
            self.handler.remove_state(session_id);
            return Err(anyhow::Error::new(e).context(format!("failed to log in session {session_id}")));
        }

        let rpc: Arc<dyn SidecarRpc> = handle;
        self.sessions
            .insert(session_id, Arc::new(SidecarSession::new(session_id, rpc)));
        self.handler.mark_waiting(session_id);
        info!(session_id, "whatsapp session started");
        Ok(())
    }

    /// Log a session out and unregister it. Returns whether it was known.
    pub async fn stop_session(&self, session_id: &str) -> Result<bool> {
        let removed = self.sessions.remove(session_id).is_some();
        self.handler.remove_state(session_id);
        if !removed {
            warn!(session_id, "whatsapp session not found");
            return Ok(false);
        }

        let handle = self.sidecar.read().await.clone();
        if let Some(handle) = handle
            && let Err(e) = handle.call(session_id, SidecarCall::Logout).await
        {
            warn!(session_id, error = %e, "logout failed");
        }
        info!(session_id, "whatsapp session stopped");
        Ok(true)
    }

    pub fn connection_state(&self, session_id: &str) -> Option<ConnectionState> {
        self.handler.state(session_id)
    }

    /// The QR code to scan, while a session is waiting for one.
    pub fn qr_code(&self, session_id: &str) -> Option<String> {
        match self.handler.state(session_id)? {
            ConnectionState::QrReceived { qr } => Some(qr),
            _ => None,
        }
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.list()
    }

    /// Drop the connection and stop the sidecar process if we own it.
    /// Registered sessions stay logged in on the sidecar side.
    pub async fn shutdown(&self) -> Result<()> {
        for session_id in self.handler.tracked() {
            self.sessions.remove(&session_id);
            self.handler.remove_state(&session_id);
        }
        *self.sidecar.write().await = None;

        let mut process = self.sidecar_process.lock().await;
        if let Some(proc) = process.as_mut() {
            proc.stop().await?;
        }
        *process = None;
        Ok(())
    }
}

/// Applies unsolicited sidecar events: connection state, registry cleanup,
/// message persistence and event republishing.
pub struct SidecarEventHandler {
    sessions: Arc<SessionRegistry>,
    states: StateMap,
    store: Arc<dyn MessageStore>,
    events: Arc<dyn EventSink>,
}

impl SidecarEventHandler {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        store: Arc<dyn MessageStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            sessions,
            states: Arc::new(StdRwLock::new(HashMap::new())),
            store,
            events,
        }
    }

    pub fn state(&self, session_id: &str) -> Option<ConnectionState> {
        let states = self.states.read().unwrap_or_else(|e| e.into_inner());
        states.get(session_id).cloned()
    }

    fn tracked(&self) -> Vec<String> {
        let states = self.states.read().unwrap_or_else(|e| e.into_inner());
        states.keys().cloned().collect()
    }

    fn set_state(&self, session_id: &str, state: ConnectionState) {
        let mut states = self.states.write().unwrap_or_else(|e| e.into_inner());
        states.insert(session_id.to_string(), state);
    }

    /// Events can beat the login response; only a fresh entry moves on.
    fn mark_waiting(&self, session_id: &str) {
        let mut states = self.states.write().unwrap_or_else(|e| e.into_inner());
        if let Some(state) = states.get_mut(session_id)
            && *state == ConnectionState::Disconnected
        {
            *state = ConnectionState::WaitingForQr;
        }
    }

    fn remove_state(&self, session_id: &str) {
        let mut states = self.states.write().unwrap_or_else(|e| e.into_inner());
        states.remove(session_id);
    }

    /// Update state only for sessions we manage.
    fn update_state(&self, session_id: &str, state: ConnectionState) -> bool {
        let mut states = self.states.write().unwrap_or_else(|e| e.into_inner());
        match states.get_mut(session_id) {
            Some(current) => {
                *current = state;
                true
            },
            None => false,
        }
    }

    pub async fn handle(&self, msg: SidecarMessage) {
        match msg {
            SidecarMessage::Qr { session_id, qr } => {
                debug!(session_id, "received qr code");
                if !self.update_state(&session_id, ConnectionState::QrReceived { qr: qr.clone() }) {
                    debug!(session_id, "qr code for unmanaged session");
                    return;
                }
                self.publish(topics::QRCODE_UPDATED, &session_id, json!({ "qr": qr }))
                    .await;
            },
            SidecarMessage::Connected {
                session_id,
                phone_number,
            } => {
                info!(session_id, ?phone_number, "whatsapp session connected");
                self.update_state(&session_id, ConnectionState::Connected {
                    phone_number: phone_number.clone(),
                });
                self.publish(
                    topics::CONNECTION_UPDATE,
                    &session_id,
                    json!({ "state": "open", "phoneNumber": phone_number }),
                )
                .await;
            },
            SidecarMessage::Disconnected { session_id, reason } => {
                warn!(session_id, ?reason, "whatsapp session disconnected");
                self.update_state(&session_id, ConnectionState::Disconnected);
                self.publish(
                    topics::CONNECTION_UPDATE,
                    &session_id,
                    json!({ "state": "close", "reason": reason }),
                )
                .await;
            },
            SidecarMessage::LoggedOut { session_id } => {
                info!(session_id, "whatsapp session logged out");
                self.sessions.remove(&session_id);
                self.remove_state(&session_id);
                self.publish(
                    topics::CONNECTION_UPDATE,
                    &session_id,
                    json!({ "state": "loggedOut" }),
                )
                .await;
            },
            SidecarMessage::MessagesUpsert {
                session_id,
                messages,
                upsert_type,
            } => {
                self.persist(&session_id, &messages).await;
                self.publish(
                    topics::MESSAGES_UPSERT,
                    &session_id,
                    json!({ "messages": messages, "type": upsert_type }),
                )
                .await;
            },
            SidecarMessage::Response { request_id, .. } => {
                debug!(request_id, "stray response frame");
            },
        }
    }

    async fn persist(&self, session_id: &str, messages: &[Value]) {
        for envelope in messages {
            let record = match NewMessage::from_envelope(session_id, envelope) {
                Ok(record) => record,
                Err(e) => {
                    warn!(session_id, error = %e, "skipping malformed upserted message");
                    continue;
                },
            };
            let id = record.id.clone();
            if let Err(e) = self.store.upsert(record).await {
                warn!(session_id, message_id = %id, error = %e, "failed to store message");
            }
        }
    }

    async fn publish(&self, event: &str, session_id: &str, data: Value) {
        self.events
            .publish(LifecycleEvent::success(event, session_id, data))
            .await;
    }
}
