//! Persistence for the stock ledger.
//!
//! This crate owns the three row families the allocation engine mutates:
//! - stock batches (lots) with their own quantity and expiry
//! - one aggregate inventory row per product
//! - the append-only movement log
//!
//! All mutations go through a [`StoreTx`] obtained from
//! [`InventoryStore::begin`], which provides row locking and all-or-nothing
//! commit. Two backends are provided: [`InMemoryInventoryStore`] and
//! [`PostgresInventoryStore`].

pub mod catalog;
pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod query;
pub mod store;

pub use catalog::{Catalog, InMemoryCatalog};
pub use common::{BatchId, Money, MovementId, ProductId};
pub use error::{Result, StoreError};
pub use memory::{InMemoryInventoryStore, InMemoryTx};
pub use model::{AggregateInventory, Batch, Movement, MovementType, NewBatch, NewMovement, Product};
pub use postgres::{PostgresCatalog, PostgresInventoryStore, PostgresTx};
pub use query::MovementQuery;
pub use store::{InventoryStore, MovementStream, StoreTx};

/// Lock wait used when no explicit timeout is configured.
pub const DEFAULT_LOCK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);
