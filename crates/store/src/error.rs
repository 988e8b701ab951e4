use {courier_common::FromMessage, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("invalid message record: {message}")]
    InvalidRecord { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::InvalidRecord { message }
    }
}

courier_common::impl_context!();
