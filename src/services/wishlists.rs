//! Wishlists

use crate::domain::aggregates::{Product, WishlistItem};
use crate::ids::{ProductId, UserId, WishlistItemId};
use crate::{EcommerceError, Result};

use super::Deps;

#[derive(Debug, Clone)]
pub struct WishlistService {
    deps: Deps,
}

impl WishlistService {
    pub fn new(deps: Deps) -> Self {
        Self { deps }
    }

    pub async fn add(&self, user: UserId, product_id: ProductId) -> Result<WishlistItem> {
        let mut tx = self.deps.store.begin().await?;
        if tx.product(product_id).await?.is_none() {
            return Err(EcommerceError::not_found("product", product_id));
        }
        if tx.wishlist_item_for_product(user, product_id).await?.is_some() {
            return Err(EcommerceError::Conflict(format!("product {product_id} is already in the wishlist")));
        }
        let item = WishlistItem { id: WishlistItemId::generate(), user_id: user, product_id, created_at: self.deps.clock.now() };
        tx.insert_wishlist_item(&item).await?;
        tx.commit().await?;
        Ok(item)
    }

    pub async fn remove(&self, user: UserId, product_id: ProductId) -> Result<()> {
        let mut tx = self.deps.store.begin().await?;
        if !tx.delete_wishlist_item(user, product_id).await? {
            return Err(EcommerceError::not_found("wishlist item", product_id));
        }
        tx.commit().await?;
        Ok(())
    }

    /// Wishlisted products that still exist, oldest first.
    pub async fn list(&self, user: UserId) -> Result<Vec<Product>> {
        let mut tx = self.deps.store.begin().await?;
        let mut products = Vec::new();
        for item in tx.wishlist(user).await? {
            if let Some(product) = tx.product(item.product_id).await? {
                products.push(product);
            }
        }
        Ok(products)
    }
}
