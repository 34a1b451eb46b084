//! Shared types for the pharmacy stock ledger.
//!
//! - Typed row identifiers ([`ProductId`], [`BatchId`], [`MovementId`])
//! - [`Money`] stored as integer cents
//! - The [`Clock`] collaborator that supplies `now()` to the engine

pub mod clock;
pub mod money;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use money::Money;
pub use types::{BatchId, MovementId, ProductId};
