//! [`SessionCapability`] backed by the sidecar.

use std::sync::Arc;

use {
    async_trait::async_trait,
    base64::Engine as _,
    bytes::Bytes,
    courier_session::{
        AddressKind, Error, Jid, MediaMessage, MessageEnvelope, Presence, Result,
        SessionCapability,
    },
    serde::Deserialize,
    serde_json::{Map, Value},
    tracing::debug,
};

use crate::{sidecar::SidecarRpc, types::SidecarCall};

/// One authenticated WhatsApp session living inside the sidecar.
pub struct SidecarSession {
    session_id: String,
    rpc: Arc<dyn SidecarRpc>,
}

#[derive(Debug, Deserialize)]
struct OnWhatsAppEntry {
    #[serde(default)]
    exists: bool,
    jid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DownloadedPayload {
    data: String,
}

impl SidecarSession {
    pub fn new(session_id: impl Into<String>, rpc: Arc<dyn SidecarRpc>) -> Self {
        Self {
            session_id: session_id.into(),
            rpc,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn call(&self, call: SidecarCall) -> Result<Value> {
        self.rpc.call(&self.session_id, call).await
    }

    async fn lookup_number(&self, jid: &str) -> Result<Option<Jid>> {
        let formatted = Jid::format(jid, AddressKind::Number);
        let result = self
            .call(SidecarCall::OnWhatsApp {
                jid: formatted.into_inner(),
            })
            .await?;
        let entries: Vec<OnWhatsAppEntry> = match result {
            Value::Null => Vec::new(),
            Value::Array(_) => serde_json::from_value(result)?,
            other => vec![serde_json::from_value(other)?],
        };
        Ok(entries
            .into_iter()
            .find(|e| e.exists)
            .and_then(|e| e.jid)
            .map(Jid::new))
    }

    async fn lookup_group(&self, jid: &str) -> Result<Option<Jid>> {
        let formatted = Jid::format(jid, AddressKind::Group);
        match self
            .call(SidecarCall::GroupMetadata {
                jid: formatted.as_str().to_string(),
            })
            .await
        {
            Ok(meta) => Ok(Some(
                meta.get("id")
                    .and_then(Value::as_str)
                    .map_or(formatted, Jid::new),
            )),
            // Unknown groups and groups we are not part of both come back as
            // protocol errors.
            Err(Error::Remote { message, .. }) => {
                debug!(session_id = %self.session_id, jid, %message, "group lookup failed");
                Ok(None)
            },
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl SessionCapability for SidecarSession {
    async fn validate_address(&self, jid: &str, kind: AddressKind) -> Result<Option<Jid>> {
        match kind {
            AddressKind::Number => self.lookup_number(jid).await,
            AddressKind::Group => self.lookup_group(jid).await,
        }
    }

    async fn address_exists(&self, jid: &str, kind: AddressKind) -> Result<bool> {
        Ok(self.validate_address(jid, kind).await?.is_some())
    }

    async fn set_presence(&self, presence: Presence, jid: &str) -> Result<()> {
        self.call(SidecarCall::PresenceUpdate {
            presence,
            jid: jid.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn send_message(
        &self,
        jid: &str,
        content: &Value,
        options: &Map<String, Value>,
    ) -> Result<Value> {
        self.call(SidecarCall::SendMessage {
            jid: Jid::format(jid, AddressKind::Number).into_inner(),
            content: content.clone(),
            options: options.clone(),
        })
        .await
    }

    async fn modify_conversation(&self, modification: &Value, jid: &str) -> Result<Value> {
        self.call(SidecarCall::ChatModify {
            modification: modification.clone(),
            jid: jid.to_string(),
        })
        .await
    }

    async fn fetch_media(&self, media: &MediaMessage) -> Result<Bytes> {
        let result = self
            .call(SidecarCall::DownloadMedia {
                kind: media.kind(),
                media: media.descriptor().clone(),
            })
            .await?;
        let payload: DownloadedPayload = serde_json::from_value(result)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload.data.as_bytes())
            .map_err(|e| Error::external("decoding downloaded media", e))?;
        Ok(Bytes::from(bytes))
    }

    async fn request_media_reupload(&self, envelope: &MessageEnvelope) -> Result<MessageEnvelope> {
        let result = self
            .call(SidecarCall::UpdateMediaMessage {
                message: envelope.clone(),
            })
            .await?;
        Ok(serde_json::from_value(result)?)
    }
}
