/// Outcome text recorded for a bulk job whose destination does not exist.
pub const JID_NOT_FOUND: &str = "JID does not exists";

/// Outcome text recorded for a bulk job whose send failed.
pub const SEND_FAILED: &str = "An error occurred during message send";

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No live session is registered under this id.
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// The destination failed its existence or validity check.
    #[error("destination does not exist: {jid}")]
    InvalidDestination { jid: String },

    /// A quoted message could not be found in history.
    #[error("quoted message not found: {message_id}")]
    QuoteNotFound { message_id: String },

    /// The envelope carries no usable media, or its bytes could not be obtained.
    #[error("media decode failed: {message}")]
    MediaDecode { message: String },

    /// A session capability call failed.
    #[error("{operation} failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: courier_session::Error,
    },

    #[error(transparent)]
    Store(#[from] courier_store::Error),
}

impl Error {
    #[must_use]
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound {
            session_id: session_id.into(),
        }
    }

    #[must_use]
    pub fn invalid_destination(jid: impl Into<String>) -> Self {
        Self::InvalidDestination { jid: jid.into() }
    }

    #[must_use]
    pub fn media_decode(message: impl std::fmt::Display) -> Self {
        Self::MediaDecode {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn transport(operation: &'static str, source: courier_session::Error) -> Self {
        Self::Transport { operation, source }
    }

    /// Whether the failure was caused by caller input rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidDestination { .. } | Self::QuoteNotFound { .. }
        )
    }
}
