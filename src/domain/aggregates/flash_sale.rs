//! Flash Sale Aggregate

use chrono::{DateTime, Utc};
use crate::domain::events::{DomainEvent, FlashSaleEvent};
use crate::domain::value_objects::{Discount, SaleWindow};
use crate::ids::{FlashSaleId, ProductId};

/// Time-boxed promotion over a set of products.
#[derive(Clone, Debug)]
pub struct FlashSale {
    pub id: FlashSaleId,
    pub name: String,
    pub window: SaleWindow,
    pub discount: Discount,
    pub active: bool,
    pub product_ids: Vec<ProductId>,
    pub created_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

impl FlashSale {
    pub fn create(name: impl Into<String>, window: SaleWindow, discount: Discount, product_ids: Vec<ProductId>, now: DateTime<Utc>) -> Self {
        Self::restore(FlashSaleId::generate(), name.into(), window, discount, false, product_ids, now)
    }

    pub fn restore(id: FlashSaleId, name: String, window: SaleWindow, discount: Discount, active: bool, product_ids: Vec<ProductId>, created_at: DateTime<Utc>) -> Self {
        Self { id, name, window, discount, active, product_ids, created_at, events: vec![] }
    }

    pub fn is_running_at(&self, now: DateTime<Utc>) -> bool { self.window.contains(now) }

    /// Returns whether the flag changed.
    pub fn activate(&mut self) -> bool {
        if self.active { return false; }
        self.active = true;
        self.raise_event(DomainEvent::FlashSale(FlashSaleEvent::Activated { flash_sale_id: self.id }));
        true
    }

    /// Returns whether the flag changed.
    pub fn deactivate(&mut self) -> bool {
        if !self.active { return false; }
        self.active = false;
        self.raise_event(DomainEvent::FlashSale(FlashSaleEvent::Deactivated { flash_sale_id: self.id }));
        true
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}
