//! Cart re-pricing sweep

use serde::Serialize;

use crate::pricing;
use crate::services::Deps;
use crate::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepriceReport {
    pub examined: usize,
    pub updated: usize,
    pub orphaned: usize,
}

/// Re-caches every cart line at its product's current effective price.
/// Lines whose product no longer exists are left alone, and a line removed
/// or resized since it was read is not written back.
pub async fn reprice_carts(deps: &Deps) -> Result<RepriceReport> {
    let now = deps.clock.now();
    let mut tx = deps.store.begin().await?;
    let mut report = RepriceReport::default();

    for mut item in tx.all_cart_items().await? {
        report.examined += 1;
        let Some(product) = tx.product(item.product_id).await? else {
            tracing::warn!(cart_item_id = %item.id, product_id = %item.product_id, "cart line refers to a missing product");
            report.orphaned += 1;
            continue;
        };
        let price = pricing::line_price(&product, item.quantity, now);
        if price != item.price {
            item.price = price;
            if tx.update_cart_item_price(&item).await? {
                report.updated += 1;
            }
        }
    }
    tx.commit().await?;

    tracing::info!(examined = report.examined, updated = report.updated, orphaned = report.orphaned, "carts repriced");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rust_decimal::Decimal;
    use testresult::TestResult;

    use super::*;
    use crate::domain::aggregates::{CartItem, PaymentMethod};
    use crate::domain::value_objects::Money;
    use crate::ids::{ProductId, UserId};
    use crate::test_support::Harness;

    #[tokio::test]
    async fn refreshes_stale_lines() -> TestResult {
        let h = Harness::new();
        let product = h.product("Desk", 100, 10).await;
        h.ctx.carts.add(h.user, product.id(), 2).await?;
        h.set_price(product.id(), 90).await;
        assert_eq!(h.ctx.carts.cart(h.user).await?.total.amount(), Decimal::new(200, 0));

        let report = reprice_carts(&h.ctx.deps).await?;
        assert_eq!(report, RepriceReport { examined: 1, updated: 1, orphaned: 0 });
        assert_eq!(h.ctx.carts.cart(h.user).await?.total.amount(), Decimal::new(180, 0));

        let report = reprice_carts(&h.ctx.deps).await?;
        assert_eq!(report.updated, 0);
        Ok(())
    }

    #[tokio::test]
    async fn follows_sale_start_and_end() -> TestResult {
        let h = Harness::new();
        let product = h.product("Desk", 100, 10).await;
        h.ctx.carts.add(h.user, product.id(), 1).await?;
        h.start_sale(&[product.id()], 30).await;

        reprice_carts(&h.ctx.deps).await?;
        assert_eq!(h.ctx.carts.cart(h.user).await?.total.amount(), Decimal::new(70, 0));

        h.clock.advance(Duration::hours(1));
        reprice_carts(&h.ctx.deps).await?;
        assert_eq!(h.ctx.carts.cart(h.user).await?.total.amount(), Decimal::new(100, 0));
        Ok(())
    }

    #[tokio::test]
    async fn skips_orphaned_lines() -> TestResult {
        let h = Harness::new();
        let product = h.product("Desk", 100, 10).await;
        h.ctx.carts.add(h.user, product.id(), 1).await?;
        let orphan = CartItem::new(UserId::generate(), ProductId::generate(), 1, &Money::usd(Decimal::ONE));
        h.insert_cart_item(&orphan).await;
        h.set_price(product.id(), 80).await;

        let report = reprice_carts(&h.ctx.deps).await?;
        assert_eq!(report, RepriceReport { examined: 2, updated: 1, orphaned: 1 });
        Ok(())
    }

    #[tokio::test]
    async fn checked_out_carts_stay_empty() -> TestResult {
        let h = Harness::new();
        let product = h.product("Desk", 100, 10).await;
        h.ctx.carts.add(h.user, product.id(), 1).await?;
        h.set_price(product.id(), 90).await;
        h.save_address().await;
        h.ctx.checkout.checkout(Some(h.user), PaymentMethod::Card).await?;

        let report = reprice_carts(&h.ctx.deps).await?;
        assert_eq!(report, RepriceReport::default());
        assert!(h.ctx.carts.cart(h.user).await?.lines.is_empty());
        Ok(())
    }
}
