//! Catalog service: product CRUD the pricing core depends on.

use rust_decimal::Decimal;
use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::domain::aggregates::Product;
use crate::domain::value_objects::Money;
use crate::ids::ProductId;
use crate::{EcommerceError, Result};

use super::Deps;

fn non_negative(price: &Decimal) -> std::result::Result<(), ValidationError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(ValidationError::new("negative_price"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(custom = "non_negative")]
    pub base_price: Decimal,
    #[serde(default)]
    pub stock: u32,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProductUpdate {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(custom = "non_negative")]
    pub base_price: Option<Decimal>,
    pub category: Option<String>,
    pub stock: Option<u32>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct CatalogService {
    deps: Deps,
}

impl CatalogService {
    pub fn new(deps: Deps) -> Self {
        Self { deps }
    }

    pub async fn create(&self, input: NewProduct) -> Result<Product> {
        input.validate()?;
        let now = self.deps.clock.now();
        let mut product = Product::create(input.name.trim(), Money::new(input.base_price, &self.deps.config.currency), input.stock, now);
        product.set_category(input.category);

        let mut tx = self.deps.store.begin().await?;
        tx.insert_product(&product).await?;
        tx.commit().await?;

        tracing::info!(product_id = %product.id(), "product created");
        Ok(product)
    }

    pub async fn get(&self, id: ProductId) -> Result<Product> {
        let mut tx = self.deps.store.begin().await?;
        tx.product(id).await?.ok_or_else(|| EcommerceError::not_found("product", id))
    }

    pub async fn list(&self, include_inactive: bool) -> Result<Vec<Product>> {
        let mut tx = self.deps.store.begin().await?;
        let products = tx.products().await?;
        Ok(products.into_iter().filter(|p| include_inactive || p.is_active()).collect())
    }

    /// Applies the set fields. Price changes reach cached cart lines on the
    /// next re-pricing sweep.
    pub async fn update(&self, id: ProductId, update: ProductUpdate) -> Result<Product> {
        update.validate()?;
        let mut tx = self.deps.store.begin().await?;
        let mut product = tx.product_for_update(id).await?.ok_or_else(|| EcommerceError::not_found("product", id))?;

        if let Some(name) = update.name {
            product.rename(name.trim());
        }
        if let Some(price) = update.base_price {
            product.update_price(Money::new(price, &self.deps.config.currency));
        }
        if update.category.is_some() {
            product.set_category(update.category);
        }
        if let Some(stock) = update.stock {
            product.set_stock(stock);
        }
        match update.active {
            Some(true) => product.activate(),
            Some(false) => product.deactivate(),
            None => {}
        }

        tx.update_product(&product).await?;
        tx.commit().await?;

        tracing::info!(product_id = %id, "product updated");
        Ok(product)
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;
    use crate::test_support::Harness;

    #[tokio::test]
    async fn create_then_get() -> TestResult {
        let h = Harness::new();
        let created = h.ctx.catalog.create(NewProduct { name: " Desk ".into(), base_price: Decimal::new(120, 0), stock: 3, category: Some("office".into()) }).await?;
        let fetched = h.ctx.catalog.get(created.id()).await?;
        assert_eq!(fetched.name(), "Desk");
        assert_eq!(fetched.category(), Some("office"));
        assert_eq!(fetched.stock(), 3);
        assert_eq!(fetched.base_price().currency(), "USD");
        Ok(())
    }

    #[tokio::test]
    async fn rejects_invalid_input() {
        let h = Harness::new();
        let result = h.ctx.catalog.create(NewProduct { name: String::new(), base_price: Decimal::ONE, stock: 0, category: None }).await;
        assert!(matches!(result, Err(EcommerceError::ValidationFailed(_))), "got {result:?}");
        let result = h.ctx.catalog.create(NewProduct { name: "Chair".into(), base_price: Decimal::new(-1, 0), stock: 0, category: None }).await;
        assert!(matches!(result, Err(EcommerceError::ValidationFailed(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn update_and_deactivate() -> TestResult {
        let h = Harness::new();
        let product = h.product("Chair", 50, 4).await;
        let update = ProductUpdate { base_price: Some(Decimal::new(45, 0)), active: Some(false), ..Default::default() };
        let updated = h.ctx.catalog.update(product.id(), update).await?;
        assert_eq!(updated.base_price().amount(), Decimal::new(45, 0));
        assert!(!updated.is_active());
        assert!(h.ctx.catalog.list(false).await?.is_empty());
        assert_eq!(h.ctx.catalog.list(true).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let h = Harness::new();
        let result = h.ctx.catalog.get(ProductId::generate()).await;
        assert!(matches!(result, Err(EcommerceError::NotFound { entity: "product", .. })), "got {result:?}");
    }
}
