//! Read-only reports over ledger state.
//!
//! Nothing in this crate writes to the ledger: every report is computed from
//! committed inventory rows, batches and the movement log.

pub mod error;
pub mod expiry;
pub mod inventory;
pub mod movements;
pub mod service;

pub use error::{ReportError, Result};
pub use expiry::{ExpiryLine, ExpiryReport, URGENT_WITHIN_DAYS};
pub use inventory::{InventoryLine, InventorySummary};
pub use movements::{MovementSummary, PeriodTotals};
pub use service::{RECENT_DAYS, ReportService};
