use {
    courier_store::{MessageStore, StoredMessage},
    serde::Serialize,
};

use crate::Result;

pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// One page of stored history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessagePage {
    pub data: Vec<StoredMessage>,
    /// Primary key of the last row, present only when the page came back
    /// full. Pass it back as the cursor to continue.
    pub cursor: Option<i64>,
}

/// Read one page of `session_id`'s history, strictly after `cursor`.
pub async fn list_page(
    store: &dyn MessageStore,
    session_id: &str,
    cursor: Option<i64>,
    limit: u32,
) -> Result<MessagePage> {
    if limit == 0 {
        return Ok(MessagePage {
            data: Vec::new(),
            cursor: None,
        });
    }

    let data = store.list_page(session_id, cursor, limit).await?;
    let cursor = if data.len() == limit as usize {
        data.last().map(|m| m.pk_id)
    } else {
        None
    };
    Ok(MessagePage { data, cursor })
}
