//! Read-only access to catalog products.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{Product, ProductId, Result};

/// Supplies product records to the ledger. Catalog management owns them.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>>;

    /// Lists every product, ordered by id.
    async fn list_products(&self) -> Result<Vec<Product>>;
}

/// In-memory catalog for testing and single-process deployments.
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    products: Arc<RwLock<BTreeMap<ProductId, Product>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a product.
    pub async fn insert(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn get_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.products.read().await.get(&product_id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(self.products.read().await.values().cloned().collect())
    }
}
