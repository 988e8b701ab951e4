/// Config schema types (server, database, messages, whatsapp, webhook).
use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Root of `courier.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub messages: MessagesConfig,
    pub whatsapp: WhatsAppConfig,
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "0.0.0.0".
    pub bind: String,
    pub port: u16,
    /// Serve lifecycle events on `/ws`.
    pub enable_websocket: bool,
    /// Request body limit. Media payloads travel inline, so this is generous.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 3000,
            enable_websocket: false,
            max_body_bytes: 50 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite URL. Defaults to `courier.db` in the data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    /// Pause between bulk jobs that do not set their own delay.
    pub default_bulk_delay_ms: u64,
    /// History page size when the caller gives no limit.
    pub default_page_size: u32,
}

impl MessagesConfig {
    pub fn bulk_delay(&self) -> Duration {
        Duration::from_millis(self.default_bulk_delay_ms)
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            default_bulk_delay_ms: 1000,
            default_page_size: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    /// Local port the sidecar's WebSocket listens on.
    pub sidecar_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidecar_dir: Option<PathBuf>,
    /// Where the sidecar keeps per-session credentials. Defaults to
    /// `whatsapp-auth` in the data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_dir: Option<PathBuf>,
    /// Spawn the sidecar ourselves rather than connect to a running one.
    pub auto_start_sidecar: bool,
    pub request_timeout_secs: u64,
    /// Sessions to start at boot.
    pub sessions: Vec<String>,
}

impl WhatsAppConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            sidecar_port: 9121,
            sidecar_dir: None,
            auth_dir: None,
            auto_start_sidecar: true,
            request_timeout_secs: 30,
            sessions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Event names to forward. Empty forwards everything.
    pub events: Vec<String>,
    pub timeout_secs: u64,
}

impl WebhookConfig {
    pub fn forwards(&self, event: &str) -> bool {
        self.events.is_empty() || self.events.iter().any(|e| e == event)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            events: Vec::new(),
            timeout_secs: 10,
        }
    }
}
