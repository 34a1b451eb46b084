//! Movement requests accepted by the engine.

use chrono::NaiveDate;
use common::{BatchId, Money, ProductId};

/// Receipt of stock into a new or existing batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockIn {
    pub product_id: ProductId,
    /// Must be positive.
    pub quantity: i64,
    /// Cost per unit. Defaults to the product's cost price.
    pub unit_cost: Option<Money>,
    /// Existing lot to top up. A new lot is created when absent.
    pub batch_id: Option<BatchId>,
    pub expiry_date: Option<NaiveDate>,
    pub lot_number: Option<String>,
    pub supplier_id: Option<i64>,
    pub reference: String,
    pub notes: String,
}

impl StockIn {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
            unit_cost: None,
            batch_id: None,
            expiry_date: None,
            lot_number: None,
            supplier_id: None,
            reference: String::new(),
            notes: String::new(),
        }
    }

    pub fn unit_cost(mut self, unit_cost: Money) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }

    pub fn into_batch(mut self, batch_id: BatchId) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    pub fn expiring(mut self, expiry_date: NaiveDate) -> Self {
        self.expiry_date = Some(expiry_date);
        self
    }

    pub fn lot_number(mut self, lot_number: impl Into<String>) -> Self {
        self.lot_number = Some(lot_number.into());
        self
    }

    pub fn supplier(mut self, supplier_id: i64) -> Self {
        self.supplier_id = Some(supplier_id);
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// Dispense or sale of stock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockOut {
    pub product_id: ProductId,
    /// Magnitude; must be positive. Recorded on the movement as a negative quantity.
    pub quantity: i64,
    /// Lot to draw from. FEFO selection is used when absent.
    pub batch_id: Option<BatchId>,
    pub reference: String,
    pub notes: String,
}

impl StockOut {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
            batch_id: None,
            reference: String::new(),
            notes: String::new(),
        }
    }

    pub fn from_batch(mut self, batch_id: BatchId) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

/// Stock-count correction applied to the aggregate only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjustment {
    pub product_id: ProductId,
    /// Signed, non-zero.
    pub delta: i64,
    /// Defaults to the product's unit price.
    pub unit_price: Option<Money>,
    pub notes: String,
}

impl Adjustment {
    pub fn new(product_id: ProductId, delta: i64) -> Self {
        Self {
            product_id,
            delta,
            unit_price: None,
            notes: String::new(),
        }
    }

    pub fn unit_price(mut self, unit_price: Money) -> Self {
        self.unit_price = Some(unit_price);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}
