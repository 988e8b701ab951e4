use std::sync::Arc;

use {
    courier_store::MessageStore,
    serde::Serialize,
    serde_json::{Map, Value},
    tracing::debug,
};

use crate::{Result, request::QuoteReference};

/// Reply context recovered from history, ready to hand to the protocol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedQuote {
    pub key: Value,
    pub message: Option<Value>,
}

impl ResolvedQuote {
    /// Copy `options` with `quoted` set to this quote. The input is left untouched.
    pub fn apply(&self, options: Option<&Map<String, Value>>) -> Map<String, Value> {
        let mut merged = options.cloned().unwrap_or_default();
        merged.insert(
            "quoted".into(),
            serde_json::json!({ "key": self.key, "message": self.message }),
        );
        merged
    }
}

/// Looks quoted messages up in the session's stored history.
#[derive(Clone)]
pub struct QuoteResolver {
    store: Arc<dyn MessageStore>,
}

impl QuoteResolver {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// Find the quoted message by `(session, conversation, id)`.
    ///
    /// The conversation defaults to `fallback_jid` when the reference does
    /// not name one. `Ok(None)` means the message is not in history.
    pub async fn resolve(
        &self,
        session_id: &str,
        quote: &QuoteReference,
        fallback_jid: &str,
    ) -> Result<Option<ResolvedQuote>> {
        let remote_jid = quote
            .remote_jid
            .as_deref()
            .filter(|j| !j.is_empty())
            .unwrap_or(fallback_jid);

        let found = self.store.find(session_id, remote_jid, &quote.id).await?;
        if found.is_none() {
            debug!(session_id, remote_jid, id = %quote.id, "quoted message not in history");
        }
        Ok(found.map(|m| ResolvedQuote {
            key: m.key,
            message: m.message,
        }))
    }
}
