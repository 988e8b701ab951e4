use std::sync::atomic::{AtomicI64, Ordering};

use {async_trait::async_trait, tokio::sync::RwLock};

use crate::{
    Result,
    message::{MessageStore, NewMessage, StoredMessage},
};

/// Process-local message store, lost on restart.
#[derive(Default)]
pub struct InMemoryMessageStore {
    rows: RwLock<Vec<StoredMessage>>,
    next_pk: AtomicI64,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn find(
        &self,
        session_id: &str,
        remote_jid: &str,
        id: &str,
    ) -> Result<Option<StoredMessage>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|m| m.session_id == session_id && m.remote_jid == remote_jid && m.id == id)
            .cloned())
    }

    async fn list_page(
        &self,
        session_id: &str,
        after: Option<i64>,
        limit: u32,
    ) -> Result<Vec<StoredMessage>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|m| m.session_id == session_id)
            .filter(|m| after.is_none_or(|cursor| m.pk_id > cursor))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn upsert(&self, message: NewMessage) -> Result<i64> {
        let now = courier_common::time::now_ms();
        let mut rows = self.rows.write().await;
        if let Some(existing) = rows.iter_mut().find(|m| {
            m.session_id == message.session_id
                && m.remote_jid == message.remote_jid
                && m.id == message.id
        }) {
            existing.key = message.key;
            if message.message.is_some() {
                existing.message = message.message;
            }
            if message.message_timestamp.is_some() {
                existing.message_timestamp = message.message_timestamp;
            }
            if message.push_name.is_some() {
                existing.push_name = message.push_name;
            }
            existing.updated_at = now;
            return Ok(existing.pk_id);
        }

        let pk_id = self.next_pk.fetch_add(1, Ordering::Relaxed) + 1;
        rows.push(StoredMessage {
            pk_id,
            session_id: message.session_id,
            remote_jid: message.remote_jid,
            id: message.id,
            from_me: message.from_me,
            key: message.key,
            message: message.message,
            message_timestamp: message.message_timestamp,
            push_name: message.push_name,
            created_at: now,
            updated_at: now,
        });
        Ok(pk_id)
    }

    async fn delete_session(&self, session_id: &str) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|m| m.session_id != session_id);
        Ok((before - rows.len()) as u64)
    }
}
