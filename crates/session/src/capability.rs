use {
    async_trait::async_trait,
    bytes::Bytes,
    serde_json::{Map, Value},
};

use crate::{
    Result,
    envelope::{MediaMessage, MessageEnvelope},
    types::{AddressKind, Jid, Presence},
};

/// Everything the dispatch pipeline asks of one live messaging connection.
///
/// Implementations are shared across concurrent requests for the same
/// session and must serialize or safely interleave their own protocol
/// traffic; callers add no locking around them.
#[async_trait]
pub trait SessionCapability: Send + Sync {
    /// Resolve `jid` into its canonical address.
    ///
    /// Returns `Ok(None)` when the destination does not exist.
    async fn validate_address(&self, jid: &str, kind: AddressKind) -> Result<Option<Jid>>;

    /// Cheaper existence-only check used by bulk sends and deletes.
    async fn address_exists(&self, jid: &str, kind: AddressKind) -> Result<bool>;

    async fn set_presence(&self, presence: Presence, jid: &str) -> Result<()>;

    /// Send `content` to `jid`. The returned value is the protocol's raw result.
    async fn send_message(&self, jid: &str, content: &Value, options: &Map<String, Value>)
    -> Result<Value>;

    /// Apply a conversation modification (clear, archive, ...) for `jid`.
    async fn modify_conversation(&self, modification: &Value, jid: &str) -> Result<Value>;

    /// Fetch and decrypt the bytes behind a media attachment.
    async fn fetch_media(&self, media: &MediaMessage) -> Result<Bytes>;

    /// Ask the sender to re-upload expired media, returning the refreshed envelope.
    async fn request_media_reupload(&self, envelope: &MessageEnvelope) -> Result<MessageEnvelope>;
}
