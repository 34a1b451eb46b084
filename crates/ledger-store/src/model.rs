//! Rows owned by the ledger: products (read-only), batches, aggregate
//! inventory and movements.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use common::{BatchId, Money, MovementId, ProductId};
use serde::{Deserialize, Serialize};

/// A catalog product as seen by the ledger.
///
/// Created and maintained by catalog management; the ledger never writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    /// Stock at or below this level counts as low stock.
    pub reorder_level: i64,
    pub unit_price: Money,
    pub cost_price: Money,
    pub is_active: bool,
}

impl Product {
    pub fn new(
        id: ProductId,
        sku: impl Into<String>,
        name: impl Into<String>,
        reorder_level: i64,
        unit_price: Money,
        cost_price: Money,
    ) -> Self {
        Self {
            id,
            sku: sku.into(),
            name: name.into(),
            reorder_level,
            unit_price,
            cost_price,
            is_active: true,
        }
    }
}

/// A lot of one product received together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub product_id: ProductId,
    pub lot_number: Option<String>,
    /// `None` means the lot does not expire.
    pub expiry_date: Option<NaiveDate>,
    /// Never negative.
    pub quantity: i64,
    pub unit_cost: Option<Money>,
    pub supplier_id: Option<i64>,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Batch {
    /// True once the expiry date lies strictly before `today`.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|d| d < today)
    }

    /// Days until expiry; negative once expired, `None` if the lot never expires.
    pub fn days_to_expiry(&self, today: NaiveDate) -> Option<i64> {
        self.expiry_date.map(|d| (d - today).num_days())
    }

    /// Stock value at unit cost. Lots without a recorded cost are valued at zero.
    pub fn value(&self) -> Money {
        self.unit_cost
            .map(|c| c.multiply(self.quantity))
            .unwrap_or_default()
    }

    /// First-expire-first-out ordering.
    ///
    /// Earlier expiry first, lots without expiry after every dated lot, then
    /// oldest `created_at`, then lowest id so the order is total.
    pub fn fefo_cmp(&self, other: &Batch) -> Ordering {
        let by_expiry = match (self.expiry_date, other.expiry_date) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_expiry
            .then(self.created_at.cmp(&other.created_at))
            .then(self.id.cmp(&other.id))
    }
}

/// Attributes for a batch about to be created. Batches always start empty;
/// quantity arrives through an IN movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBatch {
    pub product_id: ProductId,
    pub lot_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub unit_cost: Option<Money>,
    pub supplier_id: Option<i64>,
    pub received_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl NewBatch {
    /// An anonymous zero-quantity lot anchoring an IN movement that named no batch.
    pub fn shell(product_id: ProductId, now: DateTime<Utc>) -> Self {
        Self {
            product_id,
            lot_number: None,
            expiry_date: None,
            unit_cost: None,
            supplier_id: None,
            received_at: now,
            created_at: now,
        }
    }
}

/// Cached on-hand total for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateInventory {
    pub product_id: ProductId,
    pub quantity: i64,
    pub last_updated: DateTime<Utc>,
}

impl AggregateInventory {
    pub fn empty(product_id: ProductId, now: DateTime<Utc>) -> Self {
        Self {
            product_id,
            quantity: 0,
            last_updated: now,
        }
    }

    pub fn is_low_stock(&self, reorder_level: i64) -> bool {
        self.quantity <= reorder_level
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.quantity == 0
    }

    pub fn total_value(&self, unit_price: Money) -> Money {
        unit_price.multiply(self.quantity)
    }
}

/// Kind of stock event recorded in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementType {
    /// Receipt; quantity is positive.
    In,
    /// Dispense or sale; quantity is negative.
    Out,
    /// Stock-count correction on the aggregate only; either sign.
    Adjust,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
            MovementType::Adjust => "ADJUST",
        }
    }

    /// Sign rule for the signed movement quantity.
    pub fn accepts_quantity(&self, quantity: i64) -> bool {
        match self {
            MovementType::In => quantity > 0,
            MovementType::Out => quantity < 0,
            MovementType::Adjust => true,
        }
    }
}

impl std::fmt::Display for MovementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MovementType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "IN" => Ok(MovementType::In),
            "OUT" => Ok(MovementType::Out),
            "ADJUST" => Ok(MovementType::Adjust),
            other => Err(format!("unknown movement type '{other}'")),
        }
    }
}

/// One committed, immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub product_id: ProductId,
    /// The lot that was affected. Always `None` for ADJUST.
    pub batch_id: Option<BatchId>,
    pub movement_type: MovementType,
    /// Signed: positive for IN, negative for OUT.
    pub quantity: i64,
    pub unit_price: Option<Money>,
    /// Free-text document number (invoice, GRN, prescription).
    pub reference: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

/// A movement about to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub product_id: ProductId,
    pub batch_id: Option<BatchId>,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub unit_price: Option<Money>,
    pub reference: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl NewMovement {
    pub(crate) fn into_movement(self, id: MovementId) -> Movement {
        Movement {
            id,
            product_id: self.product_id,
            batch_id: self.batch_id,
            movement_type: self.movement_type,
            quantity: self.quantity,
            unit_price: self.unit_price,
            reference: self.reference,
            notes: self.notes,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn batch(id: i64, expiry: Option<(i32, u32, u32)>, created_hour: u32) -> Batch {
        let created = Utc.with_ymd_and_hms(2024, 12, 1, created_hour, 0, 0).unwrap();
        Batch {
            id: BatchId::new(id),
            product_id: ProductId::new(1),
            lot_number: None,
            expiry_date: expiry.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap()),
            quantity: 10,
            unit_cost: None,
            supplier_id: None,
            received_at: created,
            created_at: created,
        }
    }

    #[test]
    fn fefo_orders_by_expiry_then_creation() {
        let late = batch(1, Some((2025, 6, 1)), 0);
        let early = batch(2, Some((2025, 1, 1)), 5);
        let early_older = batch(3, Some((2025, 1, 1)), 1);

        let mut batches = vec![late.clone(), early.clone(), early_older.clone()];
        batches.sort_by(Batch::fefo_cmp);

        let ids: Vec<_> = batches.iter().map(|b| b.id.as_i64()).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn fefo_puts_non_expiring_lots_last() {
        let never = batch(1, None, 0);
        let dated = batch(2, Some((2030, 1, 1)), 9);
        assert_eq!(never.fefo_cmp(&dated), Ordering::Greater);
        assert_eq!(dated.fefo_cmp(&never), Ordering::Less);
    }

    #[test]
    fn expiry_helpers() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        let b = batch(1, Some((2025, 1, 1)), 0);
        assert!(b.is_expired(today));
        assert_eq!(b.days_to_expiry(today), Some(-9));

        let same_day = batch(2, Some((2025, 1, 10)), 0);
        assert!(!same_day.is_expired(today));
        assert_eq!(same_day.days_to_expiry(today), Some(0));

        assert_eq!(batch(3, None, 0).days_to_expiry(today), None);
    }

    #[test]
    fn movement_sign_rules() {
        assert!(MovementType::In.accepts_quantity(5));
        assert!(!MovementType::In.accepts_quantity(0));
        assert!(!MovementType::In.accepts_quantity(-5));
        assert!(MovementType::Out.accepts_quantity(-5));
        assert!(!MovementType::Out.accepts_quantity(5));
        assert!(MovementType::Adjust.accepts_quantity(-3));
        assert!(MovementType::Adjust.accepts_quantity(3));
    }

    #[test]
    fn movement_type_parses_stored_form() {
        assert_eq!("OUT".parse::<MovementType>().unwrap(), MovementType::Out);
        assert!("out".parse::<MovementType>().is_err());
        assert_eq!(
            serde_json::to_string(&MovementType::Adjust).unwrap(),
            "\"ADJUST\""
        );
    }

    #[test]
    fn low_stock_is_inclusive_of_reorder_level() {
        let now = Utc::now();
        let mut inv = AggregateInventory::empty(ProductId::new(1), now);
        inv.quantity = 10;
        assert!(inv.is_low_stock(10));
        assert!(!inv.is_low_stock(9));
        assert_eq!(inv.total_value(Money::from_cents(250)).cents(), 2500);
    }
}
