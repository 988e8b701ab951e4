//! Sidecar wire protocol.
//!
//! Gateway → sidecar: `{"type":"request","requestId","sessionId","call":{"method",..}}`.
//! Sidecar → gateway: `{"type":"response","requestId","ok","result"?,"error"?,"code"?}`
//! plus unsolicited session events tagged by `type`.

use {
    courier_session::{MediaDescriptor, MediaKind, MessageEnvelope, Presence},
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// Error code the sidecar reports when media must be re-uploaded first.
pub const MEDIA_EXPIRED_CODE: &str = "media_expired";

/// One protocol operation on behalf of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SidecarCall {
    Login {
        #[serde(skip_serializing_if = "Option::is_none")]
        auth_dir: Option<String>,
    },
    Logout,
    OnWhatsApp {
        jid: String,
    },
    GroupMetadata {
        jid: String,
    },
    PresenceUpdate {
        presence: Presence,
        jid: String,
    },
    SendMessage {
        jid: String,
        content: Value,
        options: Map<String, Value>,
    },
    ChatModify {
        modification: Value,
        jid: String,
    },
    DownloadMedia {
        kind: MediaKind,
        media: MediaDescriptor,
    },
    UpdateMediaMessage {
        message: MessageEnvelope,
    },
}

impl SidecarCall {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::Logout => "logout",
            Self::OnWhatsApp { .. } => "onWhatsApp",
            Self::GroupMetadata { .. } => "groupMetadata",
            Self::PresenceUpdate { .. } => "presenceUpdate",
            Self::SendMessage { .. } => "sendMessage",
            Self::ChatModify { .. } => "chatModify",
            Self::DownloadMedia { .. } => "downloadMedia",
            Self::UpdateMediaMessage { .. } => "updateMediaMessage",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFrame<'a> {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub request_id: &'a str,
    pub session_id: &'a str,
    pub call: &'a SidecarCall,
}

impl<'a> RequestFrame<'a> {
    pub fn new(request_id: &'a str, session_id: &'a str, call: &'a SidecarCall) -> Self {
        Self {
            frame_type: "request",
            request_id,
            session_id,
            call,
        }
    }
}

/// Frames sent by the sidecar.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SidecarMessage {
    Response {
        request_id: String,
        ok: bool,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        code: Option<String>,
    },
    Qr {
        session_id: String,
        qr: String,
    },
    Connected {
        session_id: String,
        #[serde(default)]
        phone_number: Option<String>,
    },
    Disconnected {
        session_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    LoggedOut {
        session_id: String,
    },
    MessagesUpsert {
        session_id: String,
        messages: Vec<Value>,
        #[serde(default)]
        upsert_type: Option<String>,
    },
}

/// Connection state of one session as last reported by the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ConnectionState {
    Disconnected,
    WaitingForQr,
    QrReceived { qr: String },
    Connected { phone_number: Option<String> },
}
