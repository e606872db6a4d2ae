//! Error types for grid builder operations

use thiserror::Error;

/// Errors that can occur while attaching, preparing or executing a grid
///
/// `Configuration` errors describe a broken grid definition (reserved aliases,
/// missing strategy settings, primary keys never established). They are not
/// recoverable at request time. User input problems are never reported through
/// this type; see [`crate::row::ValidationErrors`].
#[derive(Debug, Error)]
pub enum GridError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Invalid annotation on column '{column}': {message}")]
    Annotation { column: String, message: String },

    #[error("Strategy error: {0}")]
    Strategy(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GridError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn unknown_column(msg: impl Into<String>) -> Self {
        Self::UnknownColumn(msg.into())
    }

    pub fn annotation(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Annotation {
            column: column.into(),
            message: message.into(),
        }
    }

    pub fn strategy(msg: impl Into<String>) -> Self {
        Self::Strategy(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// The fatal error raised when delete/update runs without primary keys
    pub fn primary_keys_not_set() -> Self {
        Self::Configuration("Primary keys were not set.".to_string())
    }

    /// Whether this error indicates a broken grid definition
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Annotation { .. } | Self::UnknownColumn(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GridError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_keys_not_set_is_configuration() {
        let err = GridError::primary_keys_not_set();
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            "Configuration error: Primary keys were not set."
        );
    }

    #[test]
    fn test_strategy_error_is_not_configuration() {
        assert!(!GridError::strategy("boom").is_configuration());
        assert!(!GridError::store("down").is_configuration());
    }

    #[test]
    fn test_annotation_error_message() {
        let err = GridError::annotation("price", "expected JSON object");
        assert_eq!(
            err.to_string(),
            "Invalid annotation on column 'price': expected JSON object"
        );
    }
}
