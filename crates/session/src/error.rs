use std::error::Error as StdError;

/// Crate-wide result type for session capability calls.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors raised by a [`SessionCapability`](crate::SessionCapability).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input payload or parameter is invalid.
    #[error("invalid session input: {message}")]
    InvalidInput { message: String },

    /// The session is not connected or not ready for this call.
    #[error("session unavailable: {message}")]
    Unavailable { message: String },

    /// The referenced media is no longer downloadable and must be re-uploaded.
    #[error("media expired: {message}")]
    MediaExpired { message: String },

    /// The call did not complete in time.
    #[error("session call timed out: {operation}")]
    Timeout { operation: String },

    /// The protocol side reported a failure.
    #[error("session call failed: {message}")]
    Remote {
        code: Option<String>,
        message: String,
    },

    /// Wrapped source error from an external dependency.
    #[error("session operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn media_expired(message: impl std::fmt::Display) -> Self {
        Self::MediaExpired {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn timeout(operation: impl std::fmt::Display) -> Self {
        Self::Timeout {
            operation: operation.to_string(),
        }
    }

    #[must_use]
    pub fn remote(code: Option<String>, message: impl std::fmt::Display) -> Self {
        Self::Remote {
            code,
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn is_media_expired(&self) -> bool {
        matches!(self, Self::MediaExpired { .. })
    }
}
