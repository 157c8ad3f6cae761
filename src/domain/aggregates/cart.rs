//! Cart Aggregate
//!
//! A cart is the set of a user's cart rows. Each row caches its line price
//! (unit price at last write times quantity); the cache goes stale when the
//! product is repriced and is refreshed by the re-pricing sweep, not on read.

use serde::Serialize;
use crate::domain::value_objects::{Money, MoneyError};
use crate::ids::{CartItemId, ProductId, UserId};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

impl CartItem {
    pub fn new(user_id: UserId, product_id: ProductId, quantity: u32, unit_price: &Money) -> Self {
        Self { id: CartItemId::generate(), user_id, product_id, quantity, price: unit_price.multiply(quantity) }
    }

    /// Sets the quantity and re-caches the line price.
    pub fn set_quantity(&mut self, quantity: u32, unit_price: &Money) {
        self.quantity = quantity;
        self.reprice(unit_price);
    }

    pub fn reprice(&mut self, unit_price: &Money) { self.price = unit_price.multiply(self.quantity); }
}

/// A cart row joined with the product name for display.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    pub product_name: String,
}

/// A user's visible cart: only lines whose product is active.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Cart {
    pub user_id: UserId,
    pub lines: Vec<CartLine>,
    pub total: Money,
}

impl Cart {
    pub fn from_lines(user_id: UserId, lines: Vec<CartLine>, currency: &str) -> Result<Self, MoneyError> {
        let total = Money::sum(currency, lines.iter().map(|l| &l.item.price))?;
        Ok(Self { user_id, lines, total })
    }

    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn item_count(&self) -> u32 { self.lines.iter().map(|l| l.item.quantity).sum() }
}
