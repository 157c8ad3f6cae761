//! Persistence port
//!
//! Services open a [`StoreTx`], read and write through it, and commit. A
//! transaction dropped without [`StoreTx::commit`] rolls back every write it
//! made, which is what keeps checkout and order revision all-or-nothing.

mod memory;
mod postgres;

pub use memory::{FailPoint, MemoryStore};
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::aggregates::{Address, CartItem, FlashSale, Order, OrderItem, OrderStatus, Product, WishlistItem};
use crate::ids::{CartItemId, FlashSaleId, OrderId, OrderItemId, ProductId, UserId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored row is invalid: {0}")]
    Corrupt(String),

    #[error("injected failure at {0:?}")]
    Injected(FailPoint),
}

/// Order listing filter; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.user_id.map_or(true, |u| order.user_id() == u)
            && self.status.map_or(true, |s| order.status() == s)
            && self.created_from.map_or(true, |from| order.created_at() >= from)
            && self.created_to.map_or(true, |to| order.created_at() < to)
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;
    /// Reads a product and holds its row until the transaction ends.
    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;
    async fn products(&mut self) -> Result<Vec<Product>, StoreError>;
    /// Products still flagged on sale whose window ended strictly before `now`.
    async fn products_with_sale_ended_before(&mut self, now: DateTime<Utc>) -> Result<Vec<Product>, StoreError>;
    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError>;
    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError>;
    /// Takes a product off sale if its window still ended strictly before
    /// `now`. Only the sale columns are written; stock and sold stay as
    /// stored. Returns whether the row changed.
    async fn clear_expired_sale(&mut self, id: ProductId, now: DateTime<Utc>) -> Result<bool, StoreError>;

    /// All flash sales in creation order.
    async fn flash_sales(&mut self) -> Result<Vec<FlashSale>, StoreError>;
    async fn flash_sale(&mut self, id: FlashSaleId) -> Result<Option<FlashSale>, StoreError>;
    async fn insert_flash_sale(&mut self, sale: &FlashSale) -> Result<(), StoreError>;
    async fn update_flash_sale(&mut self, sale: &FlashSale) -> Result<(), StoreError>;
    async fn delete_flash_sale(&mut self, id: FlashSaleId) -> Result<bool, StoreError>;

    /// A user's cart rows in the order they were added.
    async fn cart_items(&mut self, user: UserId) -> Result<Vec<CartItem>, StoreError>;
    async fn all_cart_items(&mut self) -> Result<Vec<CartItem>, StoreError>;
    async fn cart_item(&mut self, id: CartItemId) -> Result<Option<CartItem>, StoreError>;
    async fn cart_item_for_product(&mut self, user: UserId, product: ProductId) -> Result<Option<CartItem>, StoreError>;
    /// Inserts or replaces the row with the item's id.
    async fn save_cart_item(&mut self, item: &CartItem) -> Result<(), StoreError>;
    /// Writes the cached price of the line with `item`'s id, provided it
    /// still exists with the same quantity. Never inserts.
    async fn update_cart_item_price(&mut self, item: &CartItem) -> Result<bool, StoreError>;
    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<bool, StoreError>;

    async fn wishlist(&mut self, user: UserId) -> Result<Vec<WishlistItem>, StoreError>;
    async fn wishlist_item_for_product(&mut self, user: UserId, product: ProductId) -> Result<Option<WishlistItem>, StoreError>;
    async fn insert_wishlist_item(&mut self, item: &WishlistItem) -> Result<(), StoreError>;
    async fn delete_wishlist_item(&mut self, user: UserId, product: ProductId) -> Result<bool, StoreError>;

    async fn address(&mut self, user: UserId) -> Result<Option<Address>, StoreError>;
    async fn save_address(&mut self, user: UserId, address: &Address) -> Result<(), StoreError>;

    async fn next_order_number(&mut self) -> Result<u64, StoreError>;
    /// Writes the order header only; items go through [`StoreTx::save_order_item`].
    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;
    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError>;
    /// Inserts or replaces the row with the item's id.
    async fn save_order_item(&mut self, item: &OrderItem) -> Result<(), StoreError>;
    async fn delete_order_item(&mut self, id: OrderItemId) -> Result<bool, StoreError>;
    async fn order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;
    /// Matching orders, newest first.
    async fn orders(&mut self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
