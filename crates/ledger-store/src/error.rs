use thiserror::Error;

/// Errors that can occur when interacting with the ledger store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row lock could not be acquired within the configured timeout.
    /// Nothing has been written when this is returned.
    #[error("Timed out waiting for lock on {resource}")]
    LockTimeout { resource: String },

    /// The store aborted the transaction because of a conflicting writer
    /// (deadlock or serialization failure).
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// A row that must exist inside the transaction was not found.
    #[error("{table} row {id} not found")]
    RowNotFound { table: &'static str, id: i64 },

    /// A write was attempted on a row the transaction has not locked.
    #[error("Row {resource} is not locked by this transaction")]
    LockNotHeld { resource: String },

    /// A write would violate a table constraint (negative quantity,
    /// movement sign rule, batch/product mismatch).
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// A stored value could not be decoded.
    #[error("Invalid stored value: {0}")]
    InvalidData(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true if the whole operation may be retried from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::LockTimeout { .. } | StoreError::ConcurrentModification(_)
        )
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let code = match &err {
            sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
            _ => None,
        };

        match code.as_deref() {
            // lock_not_available: raised when lock_timeout expires
            Some("55P03") => StoreError::LockTimeout {
                resource: "database row".to_string(),
            },
            // deadlock_detected / serialization_failure
            Some("40P01") | Some("40001") => StoreError::ConcurrentModification(err.to_string()),
            // check_violation / foreign_key_violation
            Some("23514") | Some("23503") => StoreError::ConstraintViolation(err.to_string()),
            _ => StoreError::Database(err),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
