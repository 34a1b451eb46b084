//! Expired and soon-to-expire stock.

use std::collections::HashMap;

use chrono::NaiveDate;
use common::{BatchId, Money, ProductId};
use ledger_store::{Batch, Product};

/// Batches expiring within this many days are urgent.
pub const URGENT_WITHIN_DAYS: i64 = 7;

/// One lot with stock on hand and an expiry date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryLine {
    pub batch_id: BatchId,
    pub product_id: ProductId,
    pub product_name: String,
    pub lot_number: Option<String>,
    pub expiry_date: NaiveDate,
    /// Negative once expired.
    pub days_to_expiry: i64,
    pub quantity: i64,
    /// Quantity × unit cost.
    pub value: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExpiryReport {
    pub as_of: Option<NaiveDate>,
    pub within_days: i64,
    /// Expiry date before `as_of`.
    pub expired: Vec<ExpiryLine>,
    /// Expiring on or after `as_of` and within `within_days`.
    pub expiring_soon: Vec<ExpiryLine>,
    /// Subset of `expiring_soon` within [`URGENT_WITHIN_DAYS`].
    pub urgent: Vec<ExpiryLine>,
    pub expired_value: Money,
    pub expiring_value: Money,
}

/// Classifies every dated lot with stock on hand, earliest expiry first.
pub fn build(
    batches: &[Batch],
    products: &HashMap<ProductId, Product>,
    today: NaiveDate,
    within_days: i64,
) -> ExpiryReport {
    let mut report = ExpiryReport {
        as_of: Some(today),
        within_days,
        ..Default::default()
    };

    let mut dated: Vec<&Batch> = batches
        .iter()
        .filter(|b| b.quantity > 0 && b.expiry_date.is_some())
        .collect();
    dated.sort_by(|a, b| a.fefo_cmp(b));

    for batch in dated {
        let (Some(expiry_date), Some(days)) = (batch.expiry_date, batch.days_to_expiry(today))
        else {
            continue;
        };
        let line = ExpiryLine {
            batch_id: batch.id,
            product_id: batch.product_id,
            product_name: products
                .get(&batch.product_id)
                .map(|p| p.name.clone())
                .unwrap_or_default(),
            lot_number: batch.lot_number.clone(),
            expiry_date,
            days_to_expiry: days,
            quantity: batch.quantity,
            value: batch.value(),
        };

        if batch.is_expired(today) {
            report.expired_value += line.value;
            report.expired.push(line);
        } else if days <= within_days {
            report.expiring_value += line.value;
            if days <= URGENT_WITHIN_DAYS {
                report.urgent.push(line.clone());
            }
            report.expiring_soon.push(line);
        }
    }

    report
}
