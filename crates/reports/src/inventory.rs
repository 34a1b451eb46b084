//! Stock-level reports over the aggregate inventory.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{Money, ProductId};
use ledger_store::{AggregateInventory, Product};

/// One product's on-hand position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryLine {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub quantity: i64,
    pub reorder_level: i64,
    pub unit_price: Money,
    pub total_value: Money,
    pub is_low_stock: bool,
    pub last_updated: DateTime<Utc>,
}

impl InventoryLine {
    pub fn new(inventory: &AggregateInventory, product: &Product) -> Self {
        Self {
            product_id: product.id,
            sku: product.sku.clone(),
            name: product.name.clone(),
            quantity: inventory.quantity,
            reorder_level: product.reorder_level,
            unit_price: product.unit_price,
            total_value: inventory.total_value(product.unit_price),
            is_low_stock: inventory.is_low_stock(product.reorder_level),
            last_updated: inventory.last_updated,
        }
    }
}

/// Headline numbers across every tracked product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InventorySummary {
    /// Products with an inventory row.
    pub total_items: usize,
    /// Includes out-of-stock products whose reorder level is non-negative.
    pub low_stock_items: usize,
    pub out_of_stock_items: usize,
    /// Σ quantity × unit price.
    pub total_value: Money,
}

/// Joins inventory rows with their products. Rows whose product is missing
/// from the catalog are dropped.
pub fn lines(
    inventories: &[AggregateInventory],
    products: &HashMap<ProductId, Product>,
) -> Vec<InventoryLine> {
    inventories
        .iter()
        .filter_map(|inv| {
            products
                .get(&inv.product_id)
                .map(|product| InventoryLine::new(inv, product))
        })
        .collect()
}

pub fn summarize(lines: &[InventoryLine]) -> InventorySummary {
    InventorySummary {
        total_items: lines.len(),
        low_stock_items: lines.iter().filter(|l| l.is_low_stock).count(),
        out_of_stock_items: lines.iter().filter(|l| l.quantity == 0).count(),
        total_value: lines.iter().map(|l| l.total_value).sum(),
    }
}

/// Low-stock lines, lowest quantity first.
pub fn low_stock(lines: Vec<InventoryLine>) -> Vec<InventoryLine> {
    let mut low: Vec<_> = lines.into_iter().filter(|l| l.is_low_stock).collect();
    low.sort_by(|a, b| a.quantity.cmp(&b.quantity).then(a.product_id.cmp(&b.product_id)));
    low
}

pub fn out_of_stock(lines: Vec<InventoryLine>) -> Vec<InventoryLine> {
    lines.into_iter().filter(|l| l.quantity == 0).collect()
}
