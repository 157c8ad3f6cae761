//! Order Aggregate
//!
//! The header (user, payment method, shipping address, creation time) is
//! fixed once placed. Items stay editable only while the order is pending,
//! and each item's price is frozen at placement or revision time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Money, MoneyError};
use crate::ids::{OrderId, OrderItemId, ProductId, UserId};

#[derive(Clone, Debug)]
pub struct Order {
    id: OrderId,
    order_number: u64,
    user_id: UserId,
    status: OrderStatus,
    payment_method: PaymentMethod,
    shipping_address: String,
    items: Vec<OrderItem>,
    total: Money,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderItem { pub id: OrderItemId, pub order_id: OrderId, pub product_id: ProductId, pub quantity: u32, pub price: Money }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Completed, Canceled }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod { #[default] CashOnDelivery, Card, BankTransfer }

/// A user's saved shipping address.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct Address {
    #[validate(length(min = 1, max = 120))]
    pub recipient: String,
    #[validate(length(min = 1, max = 200))]
    pub street: String,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    pub state: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 60))]
    pub country: String,
    pub phone: Option<String>,
}

/// Every persisted field of an [`Order`].
#[derive(Clone, Debug)]
pub struct OrderParts {
    pub id: OrderId,
    pub order_number: u64,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub shipping_address: String,
    pub items: Vec<OrderItem>,
    pub total: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Completed => "completed", Self::Canceled => "canceled" }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value { "pending" => Some(Self::Pending), "completed" => Some(Self::Completed), "canceled" => Some(Self::Canceled), _ => None }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self { Self::CashOnDelivery => "cash_on_delivery", Self::Card => "card", Self::BankTransfer => "bank_transfer" }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value { "cash_on_delivery" => Some(Self::CashOnDelivery), "card" => Some(Self::Card), "bank_transfer" => Some(Self::BankTransfer), _ => None }
    }
}

impl Address {
    /// Single-line shipping label stored on the order.
    pub fn format(&self) -> String {
        let mut line = format!("{}, {}, {}", self.recipient.trim(), self.street.trim(), self.city.trim());
        if let Some(state) = self.state.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            line.push_str(", ");
            line.push_str(state);
        }
        line.push_str(&format!(" {}, {}", self.postal_code.trim(), self.country.trim()));
        if let Some(phone) = self.phone.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            line.push_str(&format!(" (tel: {phone})"));
        }
        line
    }
}

impl Order {
    pub fn create(order_number: u64, user_id: UserId, payment_method: PaymentMethod, shipping_address: String, currency: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: OrderId::generate(), order_number, user_id, status: OrderStatus::Pending, payment_method,
            shipping_address, items: vec![], total: Money::zero(currency), created_at: now, updated_at: now, events: vec![],
        }
    }

    pub fn restore(parts: OrderParts) -> Self {
        Self {
            id: parts.id, order_number: parts.order_number, user_id: parts.user_id, status: parts.status,
            payment_method: parts.payment_method, shipping_address: parts.shipping_address, items: parts.items,
            total: parts.total, created_at: parts.created_at, updated_at: parts.updated_at, events: vec![],
        }
    }

    pub fn parts(&self) -> OrderParts {
        OrderParts {
            id: self.id, order_number: self.order_number, user_id: self.user_id, status: self.status,
            payment_method: self.payment_method, shipping_address: self.shipping_address.clone(), items: self.items.clone(),
            total: self.total.clone(), created_at: self.created_at, updated_at: self.updated_at,
        }
    }

    pub fn id(&self) -> OrderId { self.id }
    pub fn order_number(&self) -> u64 { self.order_number }
    pub fn user_id(&self) -> UserId { self.user_id }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn shipping_address(&self) -> &str { &self.shipping_address }
    pub fn total(&self) -> &Money { &self.total }
    pub fn items(&self) -> &[OrderItem] { &self.items }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn item_for(&self, product_id: ProductId) -> Option<&OrderItem> { self.items.iter().find(|i| i.product_id == product_id) }

    pub fn add_item(&mut self, product_id: ProductId, quantity: u32, price: Money) -> Result<&OrderItem, OrderError> {
        self.ensure_pending()?;
        self.items.push(OrderItem { id: OrderItemId::generate(), order_id: self.id, product_id, quantity, price });
        self.recalculate()?;
        self.items.last().ok_or(OrderError::NoItems)
    }

    /// Replaces the quantity and price of the item for `product_id`, or adds one.
    pub fn upsert_item(&mut self, product_id: ProductId, quantity: u32, price: Money) -> Result<&OrderItem, OrderError> {
        self.ensure_pending()?;
        match self.items.iter().position(|i| i.product_id == product_id) {
            Some(idx) => {
                self.items[idx].quantity = quantity;
                self.items[idx].price = price;
                self.recalculate()?;
                Ok(&self.items[idx])
            }
            None => self.add_item(product_id, quantity, price),
        }
    }

    /// Drops every item whose product is not in `keep`, returning the dropped items.
    pub fn retain_products(&mut self, keep: &[ProductId]) -> Result<Vec<OrderItem>, OrderError> {
        self.ensure_pending()?;
        let (kept, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut self.items).into_iter().partition(|i| keep.contains(&i.product_id));
        self.items = kept;
        self.recalculate()?;
        Ok(dropped)
    }

    /// Records the placement once all items are in.
    pub fn placed(&mut self) -> Result<(), OrderError> {
        if self.items.is_empty() { return Err(OrderError::NoItems); }
        self.raise_event(DomainEvent::Order(OrderEvent::Placed { order_id: self.id, user_id: self.user_id, total: self.total.amount() }));
        Ok(())
    }

    pub fn revised(&mut self, skipped: usize, now: DateTime<Utc>) {
        self.updated_at = now;
        self.raise_event(DomainEvent::Order(OrderEvent::Revised { order_id: self.id, total: self.total.amount(), skipped }));
    }

    /// Pending orders may be completed or canceled; nothing else moves.
    pub fn transition(&mut self, to: OrderStatus, now: DateTime<Utc>) -> Result<(), OrderError> {
        let from = self.status;
        if from != OrderStatus::Pending || to == OrderStatus::Pending {
            return Err(OrderError::InvalidTransition { from, to });
        }
        self.status = to;
        self.updated_at = now;
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to }));
        Ok(())
    }

    pub fn ensure_pending(&self) -> Result<(), OrderError> {
        if self.status != OrderStatus::Pending { return Err(OrderError::NotPending(self.status)); }
        Ok(())
    }

    fn recalculate(&mut self) -> Result<(), OrderError> {
        self.total = Money::sum(self.total.currency(), self.items.iter().map(|i| &i.price))?;
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError { NoItems, NotPending(OrderStatus), InvalidTransition { from: OrderStatus, to: OrderStatus }, Money(MoneyError) }

impl From<MoneyError> for OrderError { fn from(e: MoneyError) -> Self { Self::Money(e) } }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoItems => write!(f, "No items"),
            Self::NotPending(status) => write!(f, "Order is {status}"),
            Self::InvalidTransition { from, to } => write!(f, "Cannot move order from {from} to {to}"),
            Self::Money(e) => write!(f, "{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn order() -> Order {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        Order::create(1001, UserId::generate(), PaymentMethod::Card, "Ada, 1 Main St, Lagos 100001, NG".into(), "USD", now)
    }

    #[test]
    fn test_order_workflow() {
        let mut order = order();
        assert_eq!(order.placed(), Err(OrderError::NoItems));
        order.add_item(ProductId::generate(), 2, Money::usd(Decimal::new(20, 0))).unwrap();
        order.placed().unwrap();
        assert_eq!(order.total().amount(), Decimal::new(20, 0));
        order.transition(OrderStatus::Completed, order.created_at()).unwrap();
        assert_eq!(order.status(), OrderStatus::Completed);
        assert_eq!(
            order.transition(OrderStatus::Canceled, order.created_at()),
            Err(OrderError::InvalidTransition { from: OrderStatus::Completed, to: OrderStatus::Canceled })
        );
        assert!(matches!(order.add_item(ProductId::generate(), 1, Money::usd(Decimal::ONE)), Err(OrderError::NotPending(_))));
    }

    #[test]
    fn test_upsert_and_retain_recompute_total() {
        let mut order = order();
        let (a, b) = (ProductId::generate(), ProductId::generate());
        order.add_item(a, 1, Money::usd(Decimal::new(10, 0))).unwrap();
        order.add_item(b, 1, Money::usd(Decimal::new(5, 0))).unwrap();
        order.upsert_item(a, 3, Money::usd(Decimal::new(27, 0))).unwrap();
        assert_eq!(order.total().amount(), Decimal::new(32, 0));
        let dropped = order.retain_products(&[a]).unwrap();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].product_id, b);
        assert_eq!(order.total().amount(), Decimal::new(27, 0));
    }

    #[test]
    fn test_address_format() {
        let mut address = Address {
            recipient: "Ada Obi".into(), street: "12 Marina Rd".into(), city: "Lagos".into(), state: Some("LA".into()),
            postal_code: "100001".into(), country: "Nigeria".into(), phone: None,
        };
        assert_eq!(address.format(), "Ada Obi, 12 Marina Rd, Lagos, LA 100001, Nigeria");
        address.state = None;
        address.phone = Some("+234 800 000".into());
        assert_eq!(address.format(), "Ada Obi, 12 Marina Rd, Lagos 100001, Nigeria (tel: +234 800 000)");
    }
}
