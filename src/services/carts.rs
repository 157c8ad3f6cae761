//! Cart service
//!
//! Every write re-caches the line price at the product's current effective
//! price. Reads return the cached prices as they are; the re-pricing sweep
//! is what pulls them back in line with the catalog.

use crate::domain::aggregates::{Cart, CartItem, CartLine, Product};
use crate::ids::{CartItemId, ProductId, UserId};
use crate::pricing;
use crate::store::StoreTx;
use crate::{EcommerceError, Result};

use super::Deps;

#[derive(Debug, Clone)]
pub struct CartService {
    deps: Deps,
}

impl CartService {
    pub fn new(deps: Deps) -> Self {
        Self { deps }
    }

    /// Adds `quantity` of a product, merging into an existing line. A merged
    /// quantity above the product's stock is clamped to the stock.
    pub async fn add(&self, user: UserId, product_id: ProductId, quantity: u32) -> Result<CartItem> {
        ensure_positive(quantity)?;
        let now = self.deps.clock.now();
        let mut tx = self.deps.store.begin().await?;
        let product = sellable(tx.as_mut(), product_id, quantity).await?;
        let unit_price = pricing::effective_unit_price(&product, now);

        let item = match tx.cart_item_for_product(user, product_id).await? {
            Some(mut existing) => {
                let merged = existing.quantity.saturating_add(quantity).min(product.stock());
                existing.set_quantity(merged, &unit_price);
                existing
            }
            None => CartItem::new(user, product_id, quantity, &unit_price),
        };

        tx.save_cart_item(&item).await?;
        tx.commit().await?;

        tracing::debug!(%user, %product_id, quantity = item.quantity, price = %item.price, "cart line saved");
        Ok(item)
    }

    /// Replaces a line's quantity, clamped to the product's stock.
    pub async fn set_quantity(&self, user: UserId, item_id: CartItemId, quantity: u32) -> Result<CartItem> {
        ensure_positive(quantity)?;
        let now = self.deps.clock.now();
        let mut tx = self.deps.store.begin().await?;
        let mut item = owned_item(tx.as_mut(), user, item_id).await?;
        let product = sellable(tx.as_mut(), item.product_id, quantity).await?;

        item.set_quantity(quantity.min(product.stock()), &pricing::effective_unit_price(&product, now));
        tx.save_cart_item(&item).await?;
        tx.commit().await?;
        Ok(item)
    }

    pub async fn remove(&self, user: UserId, item_id: CartItemId) -> Result<()> {
        let mut tx = self.deps.store.begin().await?;
        let item = owned_item(tx.as_mut(), user, item_id).await?;
        tx.delete_cart_item(item.id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// The user's cart with cached line prices. Lines for products that are
    /// gone or inactive are left out.
    pub async fn cart(&self, user: UserId) -> Result<Cart> {
        let mut tx = self.deps.store.begin().await?;
        let items = tx.cart_items(user).await?;
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            match tx.product(item.product_id).await? {
                Some(product) if product.is_active() => lines.push(CartLine { product_name: product.name().to_string(), item }),
                _ => {}
            }
        }
        Ok(Cart::from_lines(user, lines, &self.deps.config.currency)?)
    }
}

fn ensure_positive(quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(EcommerceError::ValidationFailed("quantity must be at least 1".into()));
    }
    Ok(())
}

/// Loads an active product holding at least `quantity` units.
async fn sellable(tx: &mut dyn StoreTx, product_id: ProductId, quantity: u32) -> Result<Product> {
    let product = tx.product(product_id).await?.ok_or_else(|| EcommerceError::not_found("product", product_id))?;
    if !product.is_active() {
        return Err(EcommerceError::inactive("product", product_id));
    }
    if product.stock() < quantity {
        return Err(EcommerceError::OutOfStock { product_id, requested: quantity, available: product.stock() });
    }
    Ok(product)
}

async fn owned_item(tx: &mut dyn StoreTx, user: UserId, item_id: CartItemId) -> Result<CartItem> {
    tx.cart_item(item_id)
        .await?
        .filter(|item| item.user_id == user)
        .ok_or_else(|| EcommerceError::not_found("cart item", item_id))
}
