use std::sync::Arc;

use {courier_messages::MessageService, courier_whatsapp::WhatsAppManager};

use crate::events::BroadcastEventSink;

/// Default request body limit: 50 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Everything request handlers share.
pub struct GatewayState {
    pub version: String,
    pub messages: MessageService,
    /// Source of the `/ws` event stream.
    pub events: BroadcastEventSink,
    /// Present when WhatsApp sessions are managed by this process.
    pub whatsapp: Option<Arc<WhatsAppManager>>,
    pub enable_websocket: bool,
    pub max_body_bytes: usize,
}

impl GatewayState {
    pub fn new(messages: MessageService, events: BroadcastEventSink) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            messages,
            events,
            whatsapp: None,
            enable_websocket: false,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_whatsapp(mut self, manager: Arc<WhatsAppManager>) -> Self {
        self.whatsapp = Some(manager);
        self
    }

    pub fn with_websocket(mut self, enabled: bool) -> Self {
        self.enable_websocket = enabled;
        self
    }

    pub fn with_max_body_bytes(mut self, bytes: usize) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    pub fn session_count(&self) -> usize {
        self.messages.sessions().len()
    }
}
