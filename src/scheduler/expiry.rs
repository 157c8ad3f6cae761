//! Sale expiry sweep

use crate::ids::ProductId;
use crate::services::Deps;
use crate::Result;

/// Takes every product whose sale window ended strictly before now off sale.
/// Only the sale columns are written. Returns the products changed.
pub async fn expire_sales(deps: &Deps) -> Result<Vec<ProductId>> {
    let now = deps.clock.now();
    let mut tx = deps.store.begin().await?;
    let mut expired = Vec::new();
    let mut events = Vec::new();
    for mut product in tx.products_with_sale_ended_before(now).await? {
        if product.expire_sale(now) && tx.clear_expired_sale(product.id(), now).await? {
            expired.push(product.id());
            events.extend(product.take_events());
        }
    }
    tx.commit().await?;

    deps.events.publish(events).await;
    if !expired.is_empty() {
        tracing::info!(count = expired.len(), "sales expired");
    }
    Ok(expired)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rust_decimal::Decimal;
    use testresult::TestResult;

    use super::*;
    use crate::domain::aggregates::{PaymentMethod, SaleState};
    use crate::pricing;
    use crate::test_support::Harness;

    #[tokio::test]
    async fn expires_only_sales_that_have_ended() -> TestResult {
        let h = Harness::new();
        let ending = h.product("Toaster", 40, 5).await;
        let running = h.product("Grill", 200, 5).await;
        h.start_sale(&[ending.id()], 50).await;
        h.start_sale_until(running.id(), 25, h.clock_now() + Duration::hours(5)).await;

        // The window is half open: at its end the sale no longer prices but
        // is not yet swept.
        h.clock.advance(Duration::hours(1));
        assert!(expire_sales(&h.ctx.deps).await?.is_empty());
        let product = h.ctx.catalog.get(ending.id()).await?;
        assert_eq!(pricing::effective_unit_price(&product, h.clock_now()).amount(), Decimal::new(40, 0));

        h.clock.advance(Duration::seconds(1));
        assert_eq!(expire_sales(&h.ctx.deps).await?, vec![ending.id()]);

        let product = h.ctx.catalog.get(ending.id()).await?;
        assert_eq!(product.sale(), &SaleState::NotOnSale);
        let columns = product.sale_columns();
        assert_eq!((columns.on_sale, columns.discount, columns.discounted_price.amount()), (false, 0, Decimal::ZERO));
        assert!(h.ctx.catalog.get(running.id()).await?.is_on_sale(h.clock_now()));
        Ok(())
    }

    #[tokio::test]
    async fn no_live_sale_survives_a_sweep() -> TestResult {
        let h = Harness::new();
        let mut ids = Vec::new();
        for hours in 1..=4 {
            let product = h.product("Item", 10 * hours, 5).await;
            h.start_sale_until(product.id(), 10, h.clock_now() + Duration::hours(hours)).await;
            ids.push(product.id());
        }
        for step in 0..6 {
            h.clock.advance(Duration::minutes(50));
            expire_sales(&h.ctx.deps).await?;
            let now = h.clock_now();
            for id in &ids {
                let product = h.ctx.catalog.get(*id).await?;
                if let SaleState::OnSale { window, .. } = product.sale() {
                    assert!(!window.ended_before(now), "step {step}: sale ended at {} still stored", window.end());
                }
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn expiry_leaves_stock_and_sold_alone() -> TestResult {
        let h = Harness::new();
        let product = h.product("Kettle", 30, 10).await;
        h.start_sale(&[product.id()], 20).await;
        h.ctx.carts.add(h.user, product.id(), 2).await?;
        h.save_address().await;
        h.ctx.checkout.checkout(Some(h.user), PaymentMethod::Card).await?;

        h.clock.advance(Duration::hours(2));
        assert_eq!(expire_sales(&h.ctx.deps).await?, vec![product.id()]);

        let product = h.ctx.catalog.get(product.id()).await?;
        assert_eq!((product.stock(), product.sold()), (8, 2));
        assert_eq!(product.sale(), &SaleState::NotOnSale);
        Ok(())
    }
}
