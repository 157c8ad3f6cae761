//! Shared fixtures for service and sweep tests.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::clock::{Clock, ManualClock};
use crate::config::CommerceConfig;
use crate::domain::aggregates::{Address, CartItem, FlashSale, Product};
use crate::domain::value_objects::{Discount, SaleWindow};
use crate::events::{EventSink, LogSink, MockEventSink};
use crate::ids::{FlashSaleId, ProductId, UserId};
use crate::services::{AppContext, Deps, NewProduct, ProductUpdate};
use crate::store::{MemoryStore, Store};

pub(crate) struct Harness {
    pub ctx: AppContext,
    pub store: MemoryStore,
    pub clock: ManualClock,
    pub user: UserId,
}

pub(crate) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

impl Harness {
    pub fn new() -> Self {
        Self::build(CommerceConfig::default(), Arc::new(LogSink))
    }

    pub fn with_config(config: CommerceConfig) -> Self {
        Self::build(config, Arc::new(LogSink))
    }

    pub fn with_sink(sink: MockEventSink) -> Self {
        Self::build(CommerceConfig::default(), Arc::new(sink))
    }

    fn build(config: CommerceConfig, events: Arc<dyn EventSink>) -> Self {
        let store = MemoryStore::new();
        let clock = ManualClock::new(start_time());
        let deps = Deps { store: Arc::new(store.clone()), clock: Arc::new(clock.clone()), events, config };
        Self { ctx: AppContext::new(deps), store, clock, user: UserId::generate() }
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn product(&self, name: &str, price: i64, stock: u32) -> Product {
        self.ctx
            .catalog
            .create(NewProduct { name: name.into(), base_price: Decimal::new(price, 0), stock, category: None })
            .await
            .unwrap()
    }

    pub async fn set_price(&self, id: ProductId, price: i64) {
        let update = ProductUpdate { base_price: Some(Decimal::new(price, 0)), ..Default::default() };
        self.ctx.catalog.update(id, update).await.unwrap();
    }

    pub async fn deactivate(&self, id: ProductId) {
        let update = ProductUpdate { active: Some(false), ..Default::default() };
        self.ctx.catalog.update(id, update).await.unwrap();
    }

    /// Puts products on sale from an hour ago until an hour from now.
    pub async fn start_sale(&self, ids: &[ProductId], percent: u8) {
        for id in ids {
            self.start_sale_until(*id, percent, self.clock_now() + Duration::hours(1)).await;
        }
    }

    pub async fn start_sale_until(&self, id: ProductId, percent: u8, end: DateTime<Utc>) {
        let window = SaleWindow::new(self.clock_now() - Duration::hours(1), end).unwrap();
        let mut tx = self.store.begin().await.unwrap();
        let mut product = tx.product(id).await.unwrap().unwrap();
        product.start_sale(Discount::new(percent).unwrap(), window);
        tx.update_product(&product).await.unwrap();
        tx.commit().await.unwrap();
    }

    /// Stores a flash sale as-is, without touching its products.
    pub async fn insert_flash_sale(&self, name: &str, start: DateTime<Utc>, end: DateTime<Utc>, active: bool) -> FlashSale {
        let window = SaleWindow::new(start, end).unwrap();
        let sale = FlashSale::restore(FlashSaleId::generate(), name.into(), window, Discount::new(10).unwrap(), active, vec![], self.clock_now());
        let mut tx = self.store.begin().await.unwrap();
        tx.insert_flash_sale(&sale).await.unwrap();
        tx.commit().await.unwrap();
        sale
    }

    pub async fn insert_cart_item(&self, item: &CartItem) {
        let mut tx = self.store.begin().await.unwrap();
        tx.save_cart_item(item).await.unwrap();
        tx.commit().await.unwrap();
    }

    pub async fn save_address(&self) {
        self.ctx.checkout.save_address(self.user, address()).await.unwrap();
    }
}

pub(crate) fn address() -> Address {
    Address {
        recipient: "Ada Obi".into(),
        street: "12 Marina Rd".into(),
        city: "Lagos".into(),
        state: Some("LA".into()),
        postal_code: "100001".into(),
        country: "Nigeria".into(),
        phone: None,
    }
}
