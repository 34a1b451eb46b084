//! Report error types.

use thiserror::Error;

/// Errors that can occur while building a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// An error occurred reading the ledger.
    #[error("Ledger store error: {0}")]
    Store(#[from] ledger_store::StoreError),

    /// A report parameter is out of range.
    #[error("Invalid report parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;
