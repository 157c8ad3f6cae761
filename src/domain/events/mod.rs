//! Domain events
use crate::domain::aggregates::OrderStatus;
use crate::domain::value_objects::{Discount, SaleWindow};
use crate::ids::{FlashSaleId, OrderId, ProductId, UserId};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
    FlashSale(FlashSaleEvent),
}

impl DomainEvent {
    /// Subject suffix used when publishing, e.g. `order.placed`.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Product(ProductEvent::SaleStarted { .. }) => "product.sale_started",
            Self::Product(ProductEvent::SaleExpired { .. }) => "product.sale_expired",
            Self::Product(ProductEvent::StockSold { .. }) => "product.stock_sold",
            Self::Order(OrderEvent::Placed { .. }) => "order.placed",
            Self::Order(OrderEvent::Revised { .. }) => "order.revised",
            Self::Order(OrderEvent::StatusChanged { .. }) => "order.status_changed",
            Self::FlashSale(FlashSaleEvent::Activated { .. }) => "flash_sale.activated",
            Self::FlashSale(FlashSaleEvent::Deactivated { .. }) => "flash_sale.deactivated",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductEvent {
    SaleStarted { product_id: ProductId, discount: Discount, window: SaleWindow },
    SaleExpired { product_id: ProductId },
    StockSold { product_id: ProductId, quantity: u32, remaining: u32 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: OrderId, user_id: UserId, total: Decimal },
    Revised { order_id: OrderId, total: Decimal, skipped: usize },
    StatusChanged { order_id: OrderId, from: OrderStatus, to: OrderStatus },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashSaleEvent {
    Activated { flash_sale_id: FlashSaleId },
    Deactivated { flash_sale_id: FlashSaleId },
}
