//! In-memory store
//!
//! A transaction takes the store lock for its whole lifetime, works on a
//! copy of the state and swaps it in on commit. Dropping it discards the copy.
//! Fail points let tests break a transaction at a chosen write, and the lock
//! journal records the order in which product rows were locked.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::aggregates::{Address, CartItem, FlashSale, Order, OrderItem, OrderParts, Product, WishlistItem};
use crate::ids::{CartItemId, FlashSaleId, OrderId, OrderItemId, ProductId, UserId};

use super::{OrderFilter, Store, StoreError, StoreTx};

/// Writes that can be made to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    UpdateProduct,
    DeleteOrderItem,
    DeleteCartItem,
}

#[derive(Debug, Clone, Default)]
struct State {
    products: BTreeMap<ProductId, Product>,
    flash_sales: Vec<FlashSale>,
    cart_items: Vec<CartItem>,
    wishlist: Vec<WishlistItem>,
    addresses: HashMap<UserId, Address>,
    orders: BTreeMap<OrderId, OrderParts>,
    order_items: Vec<OrderItem>,
    order_seq: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    faults: Arc<StdMutex<Vec<FailPoint>>>,
    locks: Arc<StdMutex<Vec<ProductId>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next write at `point` fail.
    pub fn fail_on(&self, point: FailPoint) {
        self.faults.lock().unwrap_or_else(|e| e.into_inner()).push(point);
    }

    /// Product ids passed to `product_for_update` since the last call, in order.
    pub fn take_locks(&self) -> Vec<ProductId> {
        std::mem::take(&mut *self.locks.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work, faults: Arc::clone(&self.faults), locks: Arc::clone(&self.locks) }))
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<State>,
    work: State,
    faults: Arc<StdMutex<Vec<FailPoint>>>,
    locks: Arc<StdMutex<Vec<ProductId>>>,
}

impl MemoryTx {
    fn trip(&self, point: FailPoint) -> Result<(), StoreError> {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        match faults.iter().position(|p| *p == point) {
            Some(idx) => {
                faults.remove(idx);
                Err(StoreError::Injected(point))
            }
            None => Ok(()),
        }
    }

    fn assemble(&self, parts: &OrderParts) -> Order {
        let mut parts = parts.clone();
        parts.items = self.work.order_items.iter().filter(|i| i.order_id == parts.id).cloned().collect();
        Order::restore(parts)
    }
}

fn stored(product: &Product) -> Product {
    Product::restore(product.parts())
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.work.products.get(&id).cloned())
    }

    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).push(id);
        self.product(id).await
    }

    async fn products(&mut self) -> Result<Vec<Product>, StoreError> {
        Ok(self.work.products.values().cloned().collect())
    }

    async fn products_with_sale_ended_before(&mut self, now: DateTime<Utc>) -> Result<Vec<Product>, StoreError> {
        Ok(self.work.products.values().filter(|p| p.sale_columns().sale_end.is_some_and(|end| end < now)).cloned().collect())
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        self.work.products.insert(product.id(), stored(product));
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError> {
        self.trip(FailPoint::UpdateProduct)?;
        self.work.products.insert(product.id(), stored(product));
        Ok(())
    }

    async fn clear_expired_sale(&mut self, id: ProductId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let Some(product) = self.work.products.get_mut(&id) else { return Ok(false) };
        let expired = product.expire_sale(now);
        product.take_events();
        Ok(expired)
    }

    async fn flash_sales(&mut self) -> Result<Vec<FlashSale>, StoreError> {
        Ok(self.work.flash_sales.clone())
    }

    async fn flash_sale(&mut self, id: FlashSaleId) -> Result<Option<FlashSale>, StoreError> {
        Ok(self.work.flash_sales.iter().find(|s| s.id == id).cloned())
    }

    async fn insert_flash_sale(&mut self, sale: &FlashSale) -> Result<(), StoreError> {
        let mut sale = sale.clone();
        sale.take_events();
        self.work.flash_sales.push(sale);
        Ok(())
    }

    async fn update_flash_sale(&mut self, sale: &FlashSale) -> Result<(), StoreError> {
        if let Some(existing) = self.work.flash_sales.iter_mut().find(|s| s.id == sale.id) {
            *existing = sale.clone();
            existing.take_events();
        }
        Ok(())
    }

    async fn delete_flash_sale(&mut self, id: FlashSaleId) -> Result<bool, StoreError> {
        let before = self.work.flash_sales.len();
        self.work.flash_sales.retain(|s| s.id != id);
        Ok(self.work.flash_sales.len() < before)
    }

    async fn cart_items(&mut self, user: UserId) -> Result<Vec<CartItem>, StoreError> {
        Ok(self.work.cart_items.iter().filter(|i| i.user_id == user).cloned().collect())
    }

    async fn all_cart_items(&mut self) -> Result<Vec<CartItem>, StoreError> {
        Ok(self.work.cart_items.clone())
    }

    async fn cart_item(&mut self, id: CartItemId) -> Result<Option<CartItem>, StoreError> {
        Ok(self.work.cart_items.iter().find(|i| i.id == id).cloned())
    }

    async fn cart_item_for_product(&mut self, user: UserId, product: ProductId) -> Result<Option<CartItem>, StoreError> {
        Ok(self.work.cart_items.iter().find(|i| i.user_id == user && i.product_id == product).cloned())
    }

    async fn save_cart_item(&mut self, item: &CartItem) -> Result<(), StoreError> {
        match self.work.cart_items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => self.work.cart_items.push(item.clone()),
        }
        Ok(())
    }

    async fn update_cart_item_price(&mut self, item: &CartItem) -> Result<bool, StoreError> {
        match self.work.cart_items.iter_mut().find(|i| i.id == item.id && i.quantity == item.quantity) {
            Some(existing) => {
                existing.price = item.price.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<bool, StoreError> {
        self.trip(FailPoint::DeleteCartItem)?;
        let before = self.work.cart_items.len();
        self.work.cart_items.retain(|i| i.id != id);
        Ok(self.work.cart_items.len() < before)
    }

    async fn wishlist(&mut self, user: UserId) -> Result<Vec<WishlistItem>, StoreError> {
        Ok(self.work.wishlist.iter().filter(|i| i.user_id == user).cloned().collect())
    }

    async fn wishlist_item_for_product(&mut self, user: UserId, product: ProductId) -> Result<Option<WishlistItem>, StoreError> {
        Ok(self.work.wishlist.iter().find(|i| i.user_id == user && i.product_id == product).cloned())
    }

    async fn insert_wishlist_item(&mut self, item: &WishlistItem) -> Result<(), StoreError> {
        self.work.wishlist.push(item.clone());
        Ok(())
    }

    async fn delete_wishlist_item(&mut self, user: UserId, product: ProductId) -> Result<bool, StoreError> {
        let before = self.work.wishlist.len();
        self.work.wishlist.retain(|i| !(i.user_id == user && i.product_id == product));
        Ok(self.work.wishlist.len() < before)
    }

    async fn address(&mut self, user: UserId) -> Result<Option<Address>, StoreError> {
        Ok(self.work.addresses.get(&user).cloned())
    }

    async fn save_address(&mut self, user: UserId, address: &Address) -> Result<(), StoreError> {
        self.work.addresses.insert(user, address.clone());
        Ok(())
    }

    async fn next_order_number(&mut self) -> Result<u64, StoreError> {
        self.work.order_seq += 1;
        Ok(1000 + self.work.order_seq)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let mut parts = order.parts();
        parts.items.clear();
        self.work.orders.insert(parts.id, parts);
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let mut parts = order.parts();
        parts.items.clear();
        self.work.orders.insert(parts.id, parts);
        Ok(())
    }

    async fn save_order_item(&mut self, item: &OrderItem) -> Result<(), StoreError> {
        match self.work.order_items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => self.work.order_items.push(item.clone()),
        }
        Ok(())
    }

    async fn delete_order_item(&mut self, id: OrderItemId) -> Result<bool, StoreError> {
        self.trip(FailPoint::DeleteOrderItem)?;
        let before = self.work.order_items.len();
        self.work.order_items.retain(|i| i.id != id);
        Ok(self.work.order_items.len() < before)
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.work.orders.get(&id).map(|parts| self.assemble(parts)))
    }

    async fn orders(&mut self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self.work.orders.values().map(|parts| self.assemble(parts)).filter(|o| filter.matches(o)).collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(b.order_number().cmp(&a.order_number())));
        Ok(orders)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { mut guard, work, .. } = *self;
        *guard = work;
        Ok(())
    }
}
