use chrono::{DateTime, Utc};

use crate::{BatchId, Movement, MovementType, ProductId};

/// Builder for movement history queries.
///
/// Results are always returned newest first (`created_at` descending, then id
/// descending).
#[derive(Debug, Clone, Default)]
pub struct MovementQuery {
    /// Filter by product.
    pub product_id: Option<ProductId>,

    /// Filter by the lot that was affected.
    pub batch_id: Option<BatchId>,

    /// Filter by movement types (any of these types).
    pub movement_types: Option<Vec<MovementType>>,

    /// Movements created at or after this instant.
    pub from_timestamp: Option<DateTime<Utc>>,

    /// Movements created at or before this instant.
    pub to_timestamp: Option<DateTime<Utc>>,

    /// Maximum number of movements to return.
    pub limit: Option<usize>,

    /// Number of movements to skip.
    pub offset: Option<usize>,
}

impl MovementQuery {
    /// Creates a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one product's history.
    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Default::default()
        }
    }

    pub fn product_id(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn batch_id(mut self, batch_id: BatchId) -> Self {
        self.batch_id = Some(batch_id);
        self
    }

    /// Filters by a single movement type.
    pub fn movement_type(mut self, movement_type: MovementType) -> Self {
        self.movement_types = Some(vec![movement_type]);
        self
    }

    /// Filters by multiple movement types (any of these).
    pub fn movement_types(mut self, movement_types: Vec<MovementType>) -> Self {
        self.movement_types = Some(movement_types);
        self
    }

    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the movement passes every filter. Paging is not applied.
    pub fn matches(&self, movement: &Movement) -> bool {
        if let Some(id) = self.product_id
            && movement.product_id != id
        {
            return false;
        }
        if let Some(id) = self.batch_id
            && movement.batch_id != Some(id)
        {
            return false;
        }
        if let Some(ref types) = self.movement_types
            && !types.contains(&movement.movement_type)
        {
            return false;
        }
        if let Some(from) = self.from_timestamp
            && movement.created_at < from
        {
            return false;
        }
        if let Some(to) = self.to_timestamp
            && movement.created_at > to
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::MovementId;

    fn movement(product: i64, movement_type: MovementType, quantity: i64, day: u32) -> Movement {
        Movement {
            id: MovementId::new(1),
            product_id: ProductId::new(product),
            batch_id: None,
            movement_type,
            quantity,
            unit_price: None,
            reference: String::new(),
            notes: String::new(),
            created_at: Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn query_builder_chain() {
        let query = MovementQuery::for_product(ProductId::new(7))
            .movement_type(MovementType::Out)
            .limit(50)
            .offset(10);

        assert_eq!(query.product_id, Some(ProductId::new(7)));
        assert_eq!(query.movement_types, Some(vec![MovementType::Out]));
        assert_eq!(query.limit, Some(50));
        assert_eq!(query.offset, Some(10));
    }

    #[test]
    fn matches_applies_every_filter() {
        let query = MovementQuery::new()
            .product_id(ProductId::new(1))
            .movement_types(vec![MovementType::In, MovementType::Adjust])
            .from_timestamp(Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap());

        assert!(query.matches(&movement(1, MovementType::In, 5, 3)));
        assert!(!query.matches(&movement(2, MovementType::In, 5, 3)));
        assert!(!query.matches(&movement(1, MovementType::Out, -5, 3)));
        assert!(!query.matches(&movement(1, MovementType::In, 5, 1)));
    }
}
