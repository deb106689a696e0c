//! Error types for rowcache.

use thiserror::Error;

/// Result type alias for rowcache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A value of this shape cannot take part in a key.
    #[error("Unsupported key value: {0}")]
    UnsupportedKeyValue(String),

    /// A key needs at least one value.
    #[error("Empty key is not allowed")]
    EmptyKey,

    /// No table with this name is cached.
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// The table has no column with this name.
    #[error("Column not found: {table}.{column}")]
    ColumnNotFound { table: String, column: String },

    /// The column exists but carries no secondary index.
    #[error("Column is not indexed: {table}.{column}")]
    ColumnNotIndexed { table: String, column: String },

    /// A row does not match the table's column count.
    #[error("Row shape mismatch for {table}: expected {expected} values, got {actual}")]
    RowShapeMismatch {
        table: String,
        expected: usize,
        actual: usize,
    },

    /// The schema descriptor is malformed.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Transaction has already been committed or rolled back.
    #[error("Transaction is no longer active")]
    TransactionNotActive,

    /// A subscriber's invalidate callback reported a failure.
    #[error("Subscriber failed: {0}")]
    SubscriberFailed(String),

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an unsupported key value error.
    pub fn unsupported_key<S: Into<String>>(msg: S) -> Self {
        Error::UnsupportedKeyValue(msg.into())
    }

    /// Create an invalid schema error.
    pub fn invalid_schema<S: Into<String>>(msg: S) -> Self {
        Error::InvalidSchema(msg.into())
    }

    /// Create a subscriber failure.
    pub fn subscriber<S: Into<String>>(msg: S) -> Self {
        Error::SubscriberFailed(msg.into())
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Check if this error was caused by the caller's input rather than cache state.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedKeyValue(_)
                | Error::EmptyKey
                | Error::RowShapeMismatch { .. }
                | Error::ColumnNotFound { .. }
                | Error::ColumnNotIndexed { .. }
        )
    }

    /// Check if this error indicates a misconfigured schema or option set.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidSchema(_) | Error::InvalidConfiguration(_)
        )
    }
}
