use {async_trait::async_trait, serde_json::Value, sqlx::SqlitePool, tracing::debug};

use crate::{
    Result,
    message::{MessageStore, NewMessage, StoredMessage},
};

const SELECT_COLUMNS: &str = "SELECT pk_id, session_id, remote_jid, id, from_me, key, message,
        message_timestamp, push_name, created_at, updated_at
 FROM messages";

#[derive(sqlx::FromRow)]
struct MessageRow {
    pk_id: i64,
    session_id: String,
    remote_jid: String,
    id: String,
    from_me: bool,
    key: String,
    message: Option<String>,
    message_timestamp: Option<i64>,
    push_name: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<MessageRow> for StoredMessage {
    type Error = crate::Error;

    fn try_from(r: MessageRow) -> Result<Self> {
        Ok(Self {
            pk_id: r.pk_id,
            session_id: r.session_id,
            remote_jid: r.remote_jid,
            id: r.id,
            from_me: r.from_me,
            key: serde_json::from_str(&r.key)?,
            message: r
                .message
                .as_deref()
                .map(serde_json::from_str::<Value>)
                .transpose()?,
            message_timestamp: r.message_timestamp,
            push_name: r.push_name,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// SQLite-backed message store.
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `url` and run migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(url).await?;
        crate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn find(
        &self,
        session_id: &str,
        remote_jid: &str,
        id: &str,
    ) -> Result<Option<StoredMessage>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "{SELECT_COLUMNS}
             WHERE session_id = ? AND remote_jid = ? AND id = ?
             ORDER BY pk_id
             LIMIT 1"
        ))
        .bind(session_id)
        .bind(remote_jid)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(StoredMessage::try_from).transpose()
    }

    async fn list_page(
        &self,
        session_id: &str,
        after: Option<i64>,
        limit: u32,
    ) -> Result<Vec<StoredMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "{SELECT_COLUMNS}
             WHERE session_id = ? AND (? IS NULL OR pk_id > ?)
             ORDER BY pk_id
             LIMIT ?"
        ))
        .bind(session_id)
        .bind(after)
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(StoredMessage::try_from).collect()
    }

    async fn upsert(&self, message: NewMessage) -> Result<i64> {
        let now = courier_common::time::now_ms();
        let key = serde_json::to_string(&message.key)?;
        let content = message
            .message
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let pk_id = sqlx::query_scalar::<_, i64>(
            r#"INSERT INTO messages
               (session_id, remote_jid, id, from_me, key, message,
                message_timestamp, push_name, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(session_id, remote_jid, id) DO UPDATE SET
                 key = excluded.key,
                 message = COALESCE(excluded.message, messages.message),
                 message_timestamp = COALESCE(excluded.message_timestamp, messages.message_timestamp),
                 push_name = COALESCE(excluded.push_name, messages.push_name),
                 updated_at = excluded.updated_at
               RETURNING pk_id"#,
        )
        .bind(&message.session_id)
        .bind(&message.remote_jid)
        .bind(&message.id)
        .bind(message.from_me)
        .bind(key)
        .bind(content)
        .bind(message.message_timestamp)
        .bind(&message.push_name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        debug!(
            session_id = %message.session_id,
            remote_jid = %message.remote_jid,
            id = %message.id,
            pk_id,
            "stored message"
        );
        Ok(pk_id)
    }

    async fn delete_session(&self, session_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    async fn test_store() -> SqliteMessageStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::run_migrations(&pool).await.unwrap();
        SqliteMessageStore::new(pool)
    }

    fn sample(session_id: &str, remote_jid: &str, id: &str) -> NewMessage {
        NewMessage {
            session_id: session_id.into(),
            remote_jid: remote_jid.into(),
            id: id.into(),
            from_me: false,
            key: json!({ "remoteJid": remote_jid, "id": id, "fromMe": false }),
            message: Some(json!({ "conversation": format!("body {id}") })),
            message_timestamp: Some(1_700_000_000),
            push_name: None,
        }
    }

    #[tokio::test]
    async fn find_by_composite_key() {
        let store = test_store().await;
        store.upsert(sample("s1", "a@s.whatsapp.net", "M1")).await.unwrap();
        store.upsert(sample("s2", "a@s.whatsapp.net", "M1")).await.unwrap();

        let found = store
            .find("s1", "a@s.whatsapp.net", "M1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.session_id, "s1");
        assert_eq!(found.key["id"], "M1");
        assert_eq!(found.message.unwrap()["conversation"], "body M1");

        assert!(
            store
                .find("s1", "b@s.whatsapp.net", "M1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn upsert_keeps_primary_key() {
        let store = test_store().await;
        let first = store.upsert(sample("s1", "a@s.whatsapp.net", "M1")).await.unwrap();
        let mut update = sample("s1", "a@s.whatsapp.net", "M1");
        update.message = None;
        update.push_name = Some("Ann".into());
        let second = store.upsert(update).await.unwrap();
        assert_eq!(first, second);

        let found = store
            .find("s1", "a@s.whatsapp.net", "M1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.push_name.as_deref(), Some("Ann"));
        assert!(found.message.is_some());
    }

    #[tokio::test]
    async fn list_page_is_exclusive_of_cursor() {
        let store = test_store().await;
        let mut keys = Vec::new();
        for i in 0..5 {
            keys.push(
                store
                    .upsert(sample("s1", "a@s.whatsapp.net", &format!("M{i}")))
                    .await
                    .unwrap(),
            );
        }
        store.upsert(sample("s2", "a@s.whatsapp.net", "X")).await.unwrap();

        let page = store.list_page("s1", None, 2).await.unwrap();
        assert_eq!(page.iter().map(|m| m.pk_id).collect::<Vec<_>>(), &keys[..2]);

        let page = store.list_page("s1", Some(keys[1]), 10).await.unwrap();
        assert_eq!(page.iter().map(|m| m.pk_id).collect::<Vec<_>>(), &keys[2..]);
    }

    #[tokio::test]
    async fn delete_session_only_touches_that_session() {
        let store = test_store().await;
        store.upsert(sample("s1", "a@s.whatsapp.net", "M1")).await.unwrap();
        store.upsert(sample("s2", "a@s.whatsapp.net", "M1")).await.unwrap();
        assert_eq!(store.delete_session("s1").await.unwrap(), 1);
        assert!(store.list_page("s1", None, 10).await.unwrap().is_empty());
        assert_eq!(store.list_page("s2", None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn connect_to_file_runs_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("courier.db").display());
        let store = SqliteMessageStore::connect(&url).await.unwrap();
        store.upsert(sample("s1", "a@s.whatsapp.net", "M1")).await.unwrap();
        assert_eq!(store.list_page("s1", None, 10).await.unwrap().len(), 1);
    }
}
