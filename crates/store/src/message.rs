use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

use crate::{Result, error::Context};

/// A persisted message row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    /// Monotonic primary key, also used as the pagination cursor.
    pub pk_id: i64,
    pub session_id: String,
    pub remote_jid: String,
    pub id: String,
    pub from_me: bool,
    /// Protocol message key, verbatim.
    pub key: Value,
    /// Protocol message content, verbatim.
    pub message: Option<Value>,
    pub message_timestamp: Option<i64>,
    pub push_name: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A message to insert or refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub session_id: String,
    pub remote_jid: String,
    pub id: String,
    pub from_me: bool,
    pub key: Value,
    pub message: Option<Value>,
    pub message_timestamp: Option<i64>,
    pub push_name: Option<String>,
}

impl NewMessage {
    /// Build a record from a raw protocol envelope (`{ key, message, .. }`).
    ///
    /// `key.remoteJid` and `key.id` are required.
    pub fn from_envelope(session_id: &str, envelope: &Value) -> Result<Self> {
        let key = envelope
            .get("key")
            .filter(|k| k.is_object())
            .context("missing key")?;
        let remote_jid = key
            .get("remoteJid")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .context("missing key.remoteJid")?;
        let id = key
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .context("missing key.id")?;

        Ok(Self {
            session_id: session_id.to_string(),
            remote_jid: remote_jid.to_string(),
            id: id.to_string(),
            from_me: key.get("fromMe").and_then(Value::as_bool).unwrap_or(false),
            key: key.clone(),
            message: envelope.get("message").filter(|m| !m.is_null()).cloned(),
            message_timestamp: envelope.get("messageTimestamp").and_then(parse_timestamp),
            push_name: envelope
                .get("pushName")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Protocol timestamps show up as numbers, numeric strings, or `{ low, high }` longs.
fn parse_timestamp(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        Value::Object(o) => {
            let low = o.get("low").and_then(Value::as_i64)?;
            let high = o.get("high").and_then(Value::as_i64).unwrap_or(0);
            Some((high << 32) | (low & 0xffff_ffff))
        },
        _ => None,
    }
}

/// Durable keyed storage of historical messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// First message matching the composite key, in primary-key order.
    async fn find(
        &self,
        session_id: &str,
        remote_jid: &str,
        id: &str,
    ) -> Result<Option<StoredMessage>>;

    /// Up to `limit` messages of `session_id` in primary-key order, starting
    /// strictly after `after` when given.
    async fn list_page(
        &self,
        session_id: &str,
        after: Option<i64>,
        limit: u32,
    ) -> Result<Vec<StoredMessage>>;

    /// Insert or refresh a message; returns its primary key.
    async fn upsert(&self, message: NewMessage) -> Result<i64>;

    /// Delete every message of a session.
    async fn delete_session(&self, session_id: &str) -> Result<u64>;
}
