//! Route handlers, one module per resource.

pub mod inventory;
pub mod reports;
pub mod stock;
pub mod system;
