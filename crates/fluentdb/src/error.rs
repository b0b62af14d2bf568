//! Error types for fluentdb

use std::time::Duration;
use thiserror::Error;

/// Result type alias for fluentdb operations
pub type DbResult<T> = Result<T, DbError>;

/// Error types for session and query operations
#[derive(Debug, Error)]
pub enum DbError {
    /// The session could not establish its connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// Beginning, committing or rolling back a transaction failed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Statement execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Statement exceeded its deadline
    #[error("Query timeout after {0:?}")]
    Timeout(Duration),

    /// UPDATE/DELETE without any WHERE entry while the guard is enabled
    #[error("Refusing unfiltered mutation: {0}")]
    UnfilteredMutation(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DbError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if this is a connection error
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Check if this is a transaction error
    pub fn is_transaction(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this error came from statement execution.
    ///
    /// Only these errors are subject to [`FailurePolicy`](crate::FailurePolicy).
    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query(_))
    }

    /// Map a driver error raised while opening the connection.
    pub fn from_connect_error(err: tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db_err) => Self::Connection(format!("{}: {}", db_err.code().code(), db_err.message())),
            None => Self::Connection(err.to_string()),
        }
    }

    /// Map a driver error raised by BEGIN/COMMIT/ROLLBACK.
    pub fn from_transaction_error(err: tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db_err) => Self::Transaction(db_err.message().to_string()),
            None => Self::Transaction(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_match_variants() {
        assert!(DbError::Connection("refused".into()).is_connection());
        assert!(DbError::transaction("already open").is_transaction());
        assert!(DbError::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(!DbError::config("missing host").is_query());
    }

    #[test]
    fn display_includes_context() {
        let err = DbError::decode("age", "unsupported type");
        assert_eq!(err.to_string(), "Decode error on column 'age': unsupported type");

        let err = DbError::UnfilteredMutation("DELETE FROM users".into());
        assert_eq!(err.to_string(), "Refusing unfiltered mutation: DELETE FROM users");
    }
}
