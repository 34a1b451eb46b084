use serde::{Deserialize, Serialize};

/// Identifier of a catalog product.
///
/// Products are owned by the catalog service; the ledger only refers to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(i64);

impl ProductId {
    /// Creates a product ID from its raw database value.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw database value.
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ProductId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<ProductId> for i64 {
    fn from(id: ProductId) -> Self {
        id.0
    }
}

/// Identifier of a stock batch (lot).
///
/// Batch IDs are allocated in increasing order, which makes them usable as a
/// stable lock ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(i64);

impl BatchId {
    /// Creates a batch ID from its raw database value.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw database value.
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for BatchId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<BatchId> for i64 {
    fn from(id: BatchId) -> Self {
        id.0
    }
}

/// Identifier of a ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(i64);

impl MovementId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for MovementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MovementId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_ids_order_by_allocation() {
        let first = BatchId::new(1);
        let second = BatchId::new(2);
        assert!(first < second);
    }

    #[test]
    fn product_id_serializes_as_plain_number() {
        let id = ProductId::new(42);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "42");
        let back: ProductId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn raw_value_roundtrip() {
        let id = MovementId::from(7);
        assert_eq!(id.as_i64(), 7);
        assert_eq!(i64::from(BatchId::new(3)), 3);
    }
}
