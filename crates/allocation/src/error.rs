//! Allocation error types.

use common::{BatchId, ProductId};
use ledger_store::StoreError;
use thiserror::Error;

/// Errors raised while recording movements.
///
/// Every variant is returned before the enclosing transaction commits, so a
/// rejected movement never leaves partial state behind.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// The request itself is malformed (zero or negative quantity, empty bulk list).
    #[error("Invalid {field}: {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Batch not found: {0}")]
    BatchNotFound(BatchId),

    /// The named batch holds less than the requested quantity.
    #[error("Insufficient stock in batch {batch_id}: available {available}, requested {requested}")]
    InsufficientBatchStock {
        batch_id: BatchId,
        available: i64,
        requested: i64,
    },

    /// No single batch of the product can satisfy the whole request.
    #[error("No batch of product {product_id} can supply {requested} units")]
    NoSuitableBatch { product_id: ProductId, requested: i64 },

    /// The batch belongs to a different product than the movement targets.
    #[error("Batch {batch_id} belongs to product {batch_product}, not {requested_product}")]
    BatchProductMismatch {
        batch_id: BatchId,
        batch_product: ProductId,
        requested_product: ProductId,
    },

    /// A line of a bulk call failed; the whole call was rolled back.
    #[error("Line {line}: {source}")]
    LineRejected {
        line: usize,
        #[source]
        source: Box<AllocationError>,
    },

    /// Store failure, including lock timeouts and concurrent modification.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AllocationError {
    pub fn invalid_input(field: &'static str, message: impl Into<String>) -> Self {
        AllocationError::InvalidInput {
            field,
            message: message.into(),
        }
    }

    /// Returns the innermost error, unwrapping bulk line context.
    pub fn root(&self) -> &AllocationError {
        match self {
            AllocationError::LineRejected { source, .. } => source.root(),
            other => other,
        }
    }

    /// True for transient failures where the whole operation may be retried
    /// from scratch.
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            AllocationError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// True for line errors that a bulk call may skip instead of aborting.
    pub fn is_line_invalid(&self) -> bool {
        matches!(
            self.root(),
            AllocationError::InvalidInput { .. } | AllocationError::ProductNotFound(_)
        )
    }

    /// Stable machine-readable code, used for metrics labels and API bodies.
    pub fn code(&self) -> &'static str {
        match self.root() {
            AllocationError::InvalidInput { .. } => "INVALID_INPUT",
            AllocationError::ProductNotFound(_) => "PRODUCT_NOT_FOUND",
            AllocationError::BatchNotFound(_) => "BATCH_NOT_FOUND",
            AllocationError::InsufficientBatchStock { .. } => "INSUFFICIENT_BATCH_STOCK",
            AllocationError::NoSuitableBatch { .. } => "NO_SUITABLE_BATCH",
            AllocationError::BatchProductMismatch { .. } => "BATCH_PRODUCT_MISMATCH",
            AllocationError::Store(StoreError::LockTimeout { .. }) => "LOCK_TIMEOUT",
            AllocationError::Store(StoreError::ConcurrentModification(_)) => {
                "CONCURRENT_MODIFICATION"
            }
            AllocationError::Store(_) => "STORE_ERROR",
            AllocationError::LineRejected { .. } => "LINE_REJECTED",
        }
    }
}

/// Convenience type alias for allocation results.
pub type Result<T> = std::result::Result<T, AllocationError>;
