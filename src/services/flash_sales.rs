//! Flash sale administration
//!
//! Creating a sale stamps its discount and window onto each of its products.
//! Whether the sale is the active one is a separate flag, set by the
//! activation sweep or by an explicit toggle.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::domain::aggregates::{FlashSale, SaleState};
use crate::domain::value_objects::{Discount, SaleWindow};
use crate::ids::{FlashSaleId, ProductId};
use crate::{EcommerceError, Result};

use super::{lock_products, Deps};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewFlashSale {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub discount: u8,
    #[validate(length(min = 1))]
    pub product_ids: Vec<ProductId>,
}

#[derive(Debug, Clone)]
pub struct FlashSaleService {
    deps: Deps,
}

impl FlashSaleService {
    pub fn new(deps: Deps) -> Self {
        Self { deps }
    }

    /// Records a new sale and puts its products on sale for its window.
    /// Windows may not overlap an existing sale.
    pub async fn create(&self, input: NewFlashSale) -> Result<FlashSale> {
        input.validate()?;
        let window = SaleWindow::new(input.start, input.end).map_err(|e| EcommerceError::ValidationFailed(e.to_string()))?;
        let discount = Discount::new(input.discount).map_err(|e| EcommerceError::ValidationFailed(e.to_string()))?;
        let mut product_ids = input.product_ids;
        product_ids.sort();
        product_ids.dedup();
        let now = self.deps.clock.now();

        let mut tx = self.deps.store.begin().await?;
        if let Some(clash) = tx.flash_sales().await?.into_iter().find(|s| s.window.overlaps(&window)) {
            return Err(EcommerceError::Conflict(format!("window overlaps flash sale {:?}", clash.name)));
        }

        let mut products = lock_products(&mut *tx, &product_ids).await?;
        let mut events = Vec::new();
        for &product_id in &product_ids {
            let product = products.get_mut(&product_id).ok_or_else(|| EcommerceError::not_found("product", product_id))?;
            product.start_sale(discount, window);
            tx.update_product(&product).await?;
            events.extend(product.take_events());
        }

        let sale = FlashSale::create(input.name.trim(), window, discount, product_ids, now);
        tx.insert_flash_sale(&sale).await?;
        tx.commit().await?;

        self.deps.events.publish(events).await;
        tracing::info!(flash_sale_id = %sale.id, products = sale.product_ids.len(), discount = discount.percent(), "flash sale created");
        Ok(sale)
    }

    pub async fn get(&self, id: FlashSaleId) -> Result<FlashSale> {
        let mut tx = self.deps.store.begin().await?;
        tx.flash_sale(id).await?.ok_or_else(|| EcommerceError::not_found("flash sale", id))
    }

    /// All sales in creation order.
    pub async fn list(&self) -> Result<Vec<FlashSale>> {
        let mut tx = self.deps.store.begin().await?;
        Ok(tx.flash_sales().await?)
    }

    /// The sale currently flagged active, if any.
    pub async fn active(&self) -> Result<Option<FlashSale>> {
        Ok(self.list().await?.into_iter().find(|s| s.active))
    }

    /// Flips a sale's active flag. Turning one on turns every other off.
    pub async fn toggle(&self, id: FlashSaleId) -> Result<FlashSale> {
        let mut tx = self.deps.store.begin().await?;
        let mut sales = tx.flash_sales().await?;
        let turning_on = match sales.iter().find(|s| s.id == id) {
            Some(sale) => !sale.active,
            None => return Err(EcommerceError::not_found("flash sale", id)),
        };

        let mut events = Vec::new();
        for sale in &mut sales {
            let changed = if sale.id == id {
                if turning_on { sale.activate() } else { sale.deactivate() }
            } else if turning_on {
                sale.deactivate()
            } else {
                false
            };
            if changed {
                tx.update_flash_sale(sale).await?;
                events.extend(sale.take_events());
            }
        }
        tx.commit().await?;

        self.deps.events.publish(events).await;
        tracing::info!(flash_sale_id = %id, active = turning_on, "flash sale toggled");
        sales.into_iter().find(|s| s.id == id).ok_or_else(|| EcommerceError::not_found("flash sale", id))
    }

    /// Removes a sale and takes its products off the sale it stamped.
    /// Products since moved to another sale keep that one.
    pub async fn delete(&self, id: FlashSaleId) -> Result<()> {
        let mut tx = self.deps.store.begin().await?;
        let sale = tx.flash_sale(id).await?.ok_or_else(|| EcommerceError::not_found("flash sale", id))?;

        let mut events = Vec::new();
        for product in lock_products(&mut *tx, &sale.product_ids).await?.values_mut() {
            if matches!(product.sale(), SaleState::OnSale { window, .. } if *window == sale.window) {
                product.clear_sale();
                tx.update_product(product).await?;
                events.extend(product.take_events());
            }
        }
        tx.delete_flash_sale(id).await?;
        tx.commit().await?;

        self.deps.events.publish(events).await;
        tracing::info!(flash_sale_id = %id, "flash sale deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rust_decimal::Decimal;
    use testresult::TestResult;

    use super::*;
    use crate::pricing;
    use crate::test_support::Harness;

    fn sale(h: &Harness, name: &str, from_hours: i64, to_hours: i64, products: Vec<ProductId>) -> NewFlashSale {
        let now = h.clock_now();
        NewFlashSale { name: name.into(), start: now + Duration::hours(from_hours), end: now + Duration::hours(to_hours), discount: 20, product_ids: products }
    }

    #[tokio::test]
    async fn create_puts_products_on_sale() -> TestResult {
        let h = Harness::new();
        let product = h.product("Blender", 50, 10).await;
        let created = h.ctx.flash_sales.create(sale(&h, "Lunch", -1, 1, vec![product.id()])).await?;
        assert!(!created.active);

        let product = h.ctx.catalog.get(product.id()).await?;
        assert!(product.is_on_sale(h.clock_now()));
        assert_eq!(pricing::effective_unit_price(&product, h.clock_now()).amount(), Decimal::new(40, 0));
        Ok(())
    }

    #[tokio::test]
    async fn create_validates_input() {
        let h = Harness::new();
        let product = h.product("Blender", 50, 10).await;

        let result = h.ctx.flash_sales.create(sale(&h, "Backwards", 2, 1, vec![product.id()])).await;
        assert!(matches!(result, Err(EcommerceError::ValidationFailed(_))), "got {result:?}");

        let mut zero = sale(&h, "Zero", 0, 1, vec![product.id()]);
        zero.discount = 0;
        let result = h.ctx.flash_sales.create(zero).await;
        assert!(matches!(result, Err(EcommerceError::ValidationFailed(_))), "got {result:?}");

        let result = h.ctx.flash_sales.create(sale(&h, "Empty", 0, 1, vec![])).await;
        assert!(matches!(result, Err(EcommerceError::ValidationFailed(_))), "got {result:?}");

        let result = h.ctx.flash_sales.create(sale(&h, "Ghost", 0, 1, vec![ProductId::generate()])).await;
        assert!(matches!(result, Err(EcommerceError::NotFound { .. })), "got {result:?}");
        assert!(h.ctx.flash_sales.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn overlapping_windows_conflict() -> TestResult {
        let h = Harness::new();
        let product = h.product("Blender", 50, 10).await;
        h.ctx.flash_sales.create(sale(&h, "Morning", 0, 2, vec![product.id()])).await?;

        let result = h.ctx.flash_sales.create(sale(&h, "Brunch", 1, 3, vec![product.id()])).await;
        assert!(matches!(result, Err(EcommerceError::Conflict(_))), "got {result:?}");

        h.ctx.flash_sales.create(sale(&h, "Afternoon", 2, 4, vec![product.id()])).await?;
        assert_eq!(h.ctx.flash_sales.list().await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn toggle_keeps_a_single_active_sale() -> TestResult {
        let h = Harness::new();
        let product = h.product("Blender", 50, 10).await;
        let first = h.ctx.flash_sales.create(sale(&h, "First", 0, 1, vec![product.id()])).await?;
        let second = h.ctx.flash_sales.create(sale(&h, "Second", 1, 2, vec![product.id()])).await?;

        assert!(h.ctx.flash_sales.toggle(first.id).await?.active);
        assert!(h.ctx.flash_sales.toggle(second.id).await?.active);
        let active = h.ctx.flash_sales.active().await?;
        assert_eq!(active.map(|s| s.id), Some(second.id));
        assert!(!h.ctx.flash_sales.get(first.id).await?.active);

        assert!(!h.ctx.flash_sales.toggle(second.id).await?.active);
        assert!(h.ctx.flash_sales.active().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn delete_clears_product_sale() -> TestResult {
        let h = Harness::new();
        let product = h.product("Blender", 50, 10).await;
        let created = h.ctx.flash_sales.create(sale(&h, "Lunch", -1, 1, vec![product.id()])).await?;

        h.ctx.flash_sales.delete(created.id).await?;
        let product = h.ctx.catalog.get(product.id()).await?;
        assert_eq!(product.sale(), &SaleState::NotOnSale);
        assert!(h.ctx.flash_sales.list().await?.is_empty());

        let result = h.ctx.flash_sales.delete(created.id).await;
        assert!(matches!(result, Err(EcommerceError::NotFound { .. })), "got {result:?}");
        Ok(())
    }
}
