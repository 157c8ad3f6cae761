//! Orders: listing, status changes and admin revision.

use serde::{Deserialize, Serialize};

use crate::domain::aggregates::{Order, OrderStatus};
use crate::ids::{OrderId, ProductId};
use crate::pricing;
use crate::store::OrderFilter;
use crate::{out_of_stock, EcommerceError, Result};

use super::{lock_products, Deps};

/// One line of a revision request: the quantity the order should carry for
/// a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RevisionLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ProductNotFound,
    LowStock,
}

/// A submitted line that was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedLine {
    pub product_id: ProductId,
    pub requested: u32,
    pub available: u32,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct RevisionOutcome {
    pub order: Order,
    pub skipped: Vec<SkippedLine>,
}

#[derive(Debug, Clone)]
pub struct OrderService {
    deps: Deps,
}

impl OrderService {
    pub fn new(deps: Deps) -> Self {
        Self { deps }
    }

    pub async fn get(&self, id: OrderId) -> Result<Order> {
        let mut tx = self.deps.store.begin().await?;
        tx.order(id).await?.ok_or_else(|| EcommerceError::not_found("order", id))
    }

    /// Matching orders, newest first.
    pub async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let mut tx = self.deps.store.begin().await?;
        Ok(tx.orders(filter).await?)
    }

    pub async fn set_status(&self, id: OrderId, status: OrderStatus) -> Result<Order> {
        let now = self.deps.clock.now();
        let mut tx = self.deps.store.begin().await?;
        let mut order = tx.order(id).await?.ok_or_else(|| EcommerceError::not_found("order", id))?;
        order.transition(status, now)?;
        tx.update_order(&order).await?;
        tx.commit().await?;

        self.deps.events.publish(order.take_events()).await;
        tracing::info!(order_id = %id, %status, "order status changed");
        Ok(order)
    }

    /// Rewrites a pending order's items from `lines`.
    ///
    /// Each line is priced at the product's current effective price and its
    /// quantity is taken from stock. A line whose product is missing or
    /// holds fewer units than requested is skipped and reported, leaving any
    /// existing item for that product untouched. Items for products not in
    /// `lines` are removed. If every line is skipped nothing is written.
    ///
    /// Stock taken by the items being replaced or removed is not returned.
    pub async fn revise(&self, id: OrderId, lines: Vec<RevisionLine>) -> Result<RevisionOutcome> {
        validate_lines(&lines)?;
        let now = self.deps.clock.now();

        let mut tx = self.deps.store.begin().await?;
        let mut order = tx.order(id).await?.ok_or_else(|| EcommerceError::not_found("order", id))?;
        order.ensure_pending()?;

        let wanted: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
        let mut products = lock_products(&mut *tx, &wanted).await?;

        let mut skipped = Vec::new();
        let mut events = Vec::new();
        for line in &lines {
            let Some(product) = products.get_mut(&line.product_id) else {
                tracing::warn!(order_id = %id, product_id = %line.product_id, "revision line skipped: product not found");
                skipped.push(SkippedLine { product_id: line.product_id, requested: line.quantity, available: 0, reason: SkipReason::ProductNotFound });
                continue;
            };
            if product.stock() < 1 || product.stock() < line.quantity {
                tracing::warn!(order_id = %id, product_id = %line.product_id, requested = line.quantity, available = product.stock(), "revision line skipped: low stock");
                skipped.push(SkippedLine { product_id: line.product_id, requested: line.quantity, available: product.stock(), reason: SkipReason::LowStock });
                continue;
            }

            let price = pricing::line_price(product, line.quantity, now);
            let item = order.upsert_item(line.product_id, line.quantity, price)?.clone();
            tx.save_order_item(&item).await?;
            product.sell(line.quantity).map_err(|e| out_of_stock(line.product_id, e))?;
            tx.update_product(product).await?;
            events.extend(product.take_events());
        }

        if skipped.len() == lines.len() {
            tracing::warn!(order_id = %id, skipped = skipped.len(), "revision aborted: every line skipped");
            return Err(EcommerceError::AllItemsSkippedLowStock { skipped });
        }

        let submitted: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
        for dropped in order.retain_products(&submitted)? {
            tx.delete_order_item(dropped.id).await?;
        }
        order.revised(skipped.len(), now);
        tx.update_order(&order).await?;
        tx.commit().await?;

        events.extend(order.take_events());
        self.deps.events.publish(events).await;
        tracing::info!(order_id = %id, total = %order.total(), skipped = skipped.len(), "order revised");
        Ok(RevisionOutcome { order, skipped })
    }
}

fn validate_lines(lines: &[RevisionLine]) -> Result<()> {
    if lines.is_empty() {
        return Err(EcommerceError::ValidationFailed("revision needs at least one line".into()));
    }
    if lines.iter().any(|l| l.quantity == 0) {
        return Err(EcommerceError::ValidationFailed("quantity must be at least 1".into()));
    }
    let mut seen: Vec<ProductId> = Vec::with_capacity(lines.len());
    for line in lines {
        if seen.contains(&line.product_id) {
            return Err(EcommerceError::ValidationFailed(format!("product {} listed twice", line.product_id)));
        }
        seen.push(line.product_id);
    }
    Ok(())
}
