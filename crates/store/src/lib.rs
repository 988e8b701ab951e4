//! Durable message history.
//!
//! Messages are keyed by `(session_id, remote_jid, id)` and paginated by
//! their monotonically increasing primary key.

pub mod error;
pub mod memory;
pub mod message;
pub mod sqlite;

pub use {
    error::{Error, Result},
    memory::InMemoryMessageStore,
    message::{MessageStore, NewMessage, StoredMessage},
    sqlite::SqliteMessageStore,
};

/// Run database migrations for the message store.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
