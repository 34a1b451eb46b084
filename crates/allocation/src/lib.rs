//! FEFO allocation engine and bulk movement coordinator.
//!
//! [`AllocationEngine`] records single IN, OUT and ADJUST movements, each in
//! its own transaction. [`BulkCoordinator`] records lists of them as one
//! all-or-nothing unit. Both write through a [`ledger_store::StoreTx`] and
//! never leave partial state behind on rejection.

pub mod bulk;
pub mod engine;
pub mod error;
pub mod fefo;
pub mod requests;

pub use bulk::{BulkConfig, BulkCoordinator, BulkOutcome, BulkRequest, LinePolicy, SkippedLine};
pub use engine::AllocationEngine;
pub use error::{AllocationError, Result};
pub use fefo::select_batch;
pub use requests::{Adjustment, StockIn, StockOut};
