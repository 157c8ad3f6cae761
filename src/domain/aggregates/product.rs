//! Product Aggregate
//!
//! A product's sale is a tagged state rather than a cluster of nullable
//! columns: either it is off sale, or it carries a discount and the window in
//! which that discount applies. The flat column view (`on_sale`, `discount`,
//! `sale_start`, `sale_end`, `discounted_price`) is derived for storage.

use chrono::{DateTime, Utc};
use crate::domain::events::{DomainEvent, ProductEvent};
use crate::domain::value_objects::{Discount, Money, Quantity, SaleWindow};
use crate::ids::ProductId;

#[derive(Clone, Debug)]
pub struct Product {
    id: ProductId,
    name: String,
    category: Option<String>,
    base_price: Money,
    sale: SaleState,
    stock: Quantity,
    sold: Quantity,
    active: bool,
    created_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SaleState {
    #[default]
    NotOnSale,
    OnSale { discount: Discount, window: SaleWindow },
}

/// Every persisted field of a [`Product`], used to rebuild it from storage.
#[derive(Clone, Debug)]
pub struct ProductParts {
    pub id: ProductId,
    pub name: String,
    pub category: Option<String>,
    pub base_price: Money,
    pub sale: SaleState,
    pub stock: u32,
    pub sold: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Legacy flat sale columns.
#[derive(Clone, Debug, PartialEq)]
pub struct SaleColumns {
    pub on_sale: bool,
    pub discount: u8,
    pub sale_start: Option<DateTime<Utc>>,
    pub sale_end: Option<DateTime<Utc>>,
    pub discounted_price: Money,
}

impl SaleState {
    /// Rebuilds the state from flat columns; anything incomplete or with a
    /// zero discount reads as off sale.
    pub fn from_columns(on_sale: bool, discount: u8, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        match (on_sale, Discount::new(discount), start, end) {
            (true, Ok(discount), Some(start), Some(end)) => match SaleWindow::new(start, end) {
                Ok(window) => Self::OnSale { discount, window },
                Err(_) => Self::NotOnSale,
            },
            _ => Self::NotOnSale,
        }
    }
}

impl Product {
    pub fn create(name: impl Into<String>, base_price: Money, stock: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: ProductId::generate(), name: name.into(), category: None, base_price,
            sale: SaleState::NotOnSale, stock: Quantity::new(stock), sold: Quantity::default(),
            active: true, created_at: now, events: vec![],
        }
    }

    pub fn restore(parts: ProductParts) -> Self {
        Self {
            id: parts.id, name: parts.name, category: parts.category, base_price: parts.base_price,
            sale: parts.sale, stock: Quantity::new(parts.stock), sold: Quantity::new(parts.sold),
            active: parts.active, created_at: parts.created_at, events: vec![],
        }
    }

    pub fn id(&self) -> ProductId { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn category(&self) -> Option<&str> { self.category.as_deref() }
    pub fn base_price(&self) -> &Money { &self.base_price }
    pub fn sale(&self) -> &SaleState { &self.sale }
    pub fn stock(&self) -> u32 { self.stock.value() }
    pub fn sold(&self) -> u32 { self.sold.value() }
    pub fn is_active(&self) -> bool { self.active }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    /// The discount applies at `now`.
    pub fn is_on_sale(&self, now: DateTime<Utc>) -> bool {
        matches!(self.sale, SaleState::OnSale { window, .. } if window.contains(now))
    }

    /// Base price with the stored discount applied, or the base price when
    /// the product carries no sale.
    pub fn discounted_price(&self) -> Money {
        match self.sale {
            SaleState::OnSale { discount, .. } => self.base_price.percent_off(discount),
            SaleState::NotOnSale => self.base_price.clone(),
        }
    }

    pub fn sale_columns(&self) -> SaleColumns {
        match self.sale {
            SaleState::OnSale { discount, window } => SaleColumns {
                on_sale: true, discount: discount.percent(), sale_start: Some(window.start()),
                sale_end: Some(window.end()), discounted_price: self.discounted_price(),
            },
            // An expired sale zeroes the discounted price column.
            SaleState::NotOnSale => SaleColumns {
                on_sale: false, discount: 0, sale_start: None, sale_end: None,
                discounted_price: Money::zero(self.base_price.currency()),
            },
        }
    }

    pub fn parts(&self) -> ProductParts {
        ProductParts {
            id: self.id, name: self.name.clone(), category: self.category.clone(),
            base_price: self.base_price.clone(), sale: self.sale, stock: self.stock.value(),
            sold: self.sold.value(), active: self.active, created_at: self.created_at,
        }
    }

    pub fn rename(&mut self, name: impl Into<String>) { self.name = name.into(); }
    pub fn set_category(&mut self, category: Option<String>) { self.category = category; }
    pub fn update_price(&mut self, base_price: Money) { self.base_price = base_price; }
    pub fn set_stock(&mut self, stock: u32) { self.stock = Quantity::new(stock); }
    pub fn activate(&mut self) { self.active = true; }
    pub fn deactivate(&mut self) { self.active = false; }

    pub fn start_sale(&mut self, discount: Discount, window: SaleWindow) {
        self.sale = SaleState::OnSale { discount, window };
        self.raise_event(DomainEvent::Product(ProductEvent::SaleStarted { product_id: self.id, discount, window }));
    }

    /// Clears a sale whose window ended strictly before `now`. Returns
    /// whether anything changed.
    pub fn expire_sale(&mut self, now: DateTime<Utc>) -> bool {
        match self.sale {
            SaleState::OnSale { window, .. } if window.ended_before(now) => {
                self.clear_sale();
                true
            }
            _ => false,
        }
    }

    pub fn clear_sale(&mut self) {
        if self.sale == SaleState::NotOnSale { return; }
        self.sale = SaleState::NotOnSale;
        self.raise_event(DomainEvent::Product(ProductEvent::SaleExpired { product_id: self.id }));
    }

    /// Moves `qty` units from stock to sold.
    pub fn sell(&mut self, qty: u32) -> Result<(), ProductError> {
        let available = self.stock.value();
        self.stock = self.stock.subtract(qty).ok_or(ProductError::InsufficientStock { requested: qty, available })?;
        self.sold = self.sold.add(qty);
        self.raise_event(DomainEvent::Product(ProductEvent::StockSold { product_id: self.id, quantity: qty, remaining: self.stock.value() }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ProductError { InsufficientStock { requested: u32, available: u32 } }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::InsufficientStock { requested, available } => write!(f, "Insufficient stock: requested {requested}, available {available}") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;

    fn noon() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() }

    fn widget(stock: u32) -> Product {
        Product::create("Widget", Money::usd(Decimal::new(200, 0)), stock, noon())
    }

    #[test]
    fn test_product_create() {
        let p = widget(3);
        assert_eq!(p.name(), "Widget");
        assert!(p.is_active());
        assert_eq!(p.sale(), &SaleState::NotOnSale);
        assert_eq!(p.discounted_price(), Money::usd(Decimal::new(200, 0)));
    }

    #[test]
    fn test_sale_is_live_only_inside_window() {
        let mut p = widget(3);
        let window = SaleWindow::new(noon(), noon() + Duration::hours(2)).unwrap();
        p.start_sale(Discount::new(25).unwrap(), window);
        assert!(!p.is_on_sale(noon() - Duration::seconds(1)));
        assert!(p.is_on_sale(noon()));
        assert!(!p.is_on_sale(noon() + Duration::hours(2)));
        assert_eq!(p.discounted_price().amount(), Decimal::new(150, 0));
        assert_eq!(p.take_events().len(), 1);
    }

    #[test]
    fn test_expire_sale_only_after_end() {
        let mut p = widget(3);
        let window = SaleWindow::new(noon(), noon() + Duration::hours(1)).unwrap();
        p.start_sale(Discount::new(10).unwrap(), window);
        assert!(!p.expire_sale(noon() + Duration::hours(1)));
        assert!(p.expire_sale(noon() + Duration::hours(1) + Duration::seconds(1)));
        let columns = p.sale_columns();
        assert!(!columns.on_sale);
        assert_eq!(columns.discount, 0);
        assert_eq!(columns.sale_end, None);
        assert_eq!(columns.discounted_price.amount(), Decimal::ZERO);
    }

    #[test]
    fn test_sell_moves_stock_to_sold() {
        let mut p = widget(6);
        p.sell(2).unwrap();
        assert_eq!((p.stock(), p.sold()), (4, 2));
        assert_eq!(p.sell(5), Err(ProductError::InsufficientStock { requested: 5, available: 4 }));
        assert_eq!((p.stock(), p.sold()), (4, 2));
    }

    #[test]
    fn test_sale_columns_round_trip_through_state() {
        let window = SaleWindow::new(noon(), noon() + Duration::days(1)).unwrap();
        let state = SaleState::from_columns(true, 30, Some(window.start()), Some(window.end()));
        assert_eq!(state, SaleState::OnSale { discount: Discount::new(30).unwrap(), window });
        assert_eq!(SaleState::from_columns(true, 0, Some(window.start()), Some(window.end())), SaleState::NotOnSale);
        assert_eq!(SaleState::from_columns(true, 30, None, Some(window.end())), SaleState::NotOnSale);
    }
}
