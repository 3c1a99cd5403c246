use thiserror::Error;

/// Failures reported by a [`RemoteStore`](super::RemoteStore) adapter.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Store returned {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Column not present in store schema: {0}")]
    MissingColumn(String),

    #[error("Uniqueness violation: {0}")]
    UniqueViolation(String),

    #[error("Malformed row: {0}")]
    Decode(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl StoreError {
    /// The missing column, when this is a schema mismatch.
    pub fn missing_column(&self) -> Option<&str> {
        match self {
            StoreError::MissingColumn(column) => Some(column),
            _ => None,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Transport(err.to_string())
    }
}

impl From<sea_orm::DbErr> for StoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        use sea_orm::SqlErr;

        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(message)) => {
                StoreError::UniqueViolation(message)
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}
