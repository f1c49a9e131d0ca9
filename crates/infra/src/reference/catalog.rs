use std::collections::HashMap;
use std::sync::RwLock;

use umrahops_catalog::{Product, ProductId, ProductPrice};
use umrahops_core::DomainError;

use super::StoreError;

/// Products and their price rows.
pub trait CatalogStore: Send + Sync {
    /// Insert a product; product codes are unique.
    fn insert_product(&self, product: Product) -> Result<Product, StoreError>;

    fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    fn products(&self) -> Result<Vec<Product>, StoreError>;

    /// Insert a validated price row for an existing product.
    fn insert_price(&self, price: ProductPrice) -> Result<ProductPrice, StoreError>;

    /// Every price row of a product, regardless of scope or date window.
    fn prices_for(&self, product_id: ProductId) -> Result<Vec<ProductPrice>, StoreError>;
}

#[derive(Debug, Default)]
struct Inner {
    products: HashMap<ProductId, Product>,
    prices: Vec<ProductPrice>,
}

#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    inner: RwLock<Inner>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

impl CatalogStore for InMemoryCatalogStore {
    fn insert_product(&self, product: Product) -> Result<Product, StoreError> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if inner.products.values().any(|p| p.code == product.code) {
            return Err(StoreError::Duplicate(format!("product code '{}' already exists", product.code)));
        }
        inner.products.insert(product.id, product.clone());
        Ok(product)
    }

    fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner.products.get(&id).cloned())
    }

    fn products(&self) -> Result<Vec<Product>, StoreError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        let mut products: Vec<_> = inner.products.values().cloned().collect();
        products.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(products)
    }

    fn insert_price(&self, price: ProductPrice) -> Result<ProductPrice, StoreError> {
        price.validate()?;
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if !inner.products.contains_key(&price.product_id) {
            return Err(DomainError::NotFound.into());
        }
        inner.prices.push(price.clone());
        Ok(price)
    }

    fn prices_for(&self, product_id: ProductId) -> Result<Vec<ProductPrice>, StoreError> {
        let inner = self.inner.read().map_err(|_| poisoned())?;
        Ok(inner
            .prices
            .iter()
            .filter(|p| p.product_id == product_id)
            .cloned()
            .collect())
    }
}
