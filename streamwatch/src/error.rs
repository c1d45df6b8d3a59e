//! Application-wide error types.

use thiserror::Error;

use crate::domain::DetailedStatus;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    DatabaseSqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification delivery failed: {0}")]
    Notification(String),

    /// A stream aggregate accessor was used outside the detailed status it is valid for.
    #[error("Operation `{operation}` is not valid for a stream in status {actual}")]
    InvalidDetailedStatus {
        operation: &'static str,
        actual: DetailedStatus,
    },

    /// A stream record was built without any known notification message.
    #[error("No notification message known for subscription {subscription_id}")]
    MissingMessageId { subscription_id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }

    pub fn invalid_status(operation: &'static str, actual: DetailedStatus) -> Self {
        Self::InvalidDetailedStatus { operation, actual }
    }
}
