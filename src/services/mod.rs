//! Application services
//!
//! Each service call runs in one store transaction. Events raised by the
//! aggregates it touched are published only after that transaction commits.

pub mod carts;
pub mod catalog;
pub mod checkout;
pub mod flash_sales;
pub mod orders;
pub mod wishlists;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub use carts::CartService;
pub use catalog::{CatalogService, NewProduct, ProductUpdate};
pub use checkout::CheckoutService;
pub use flash_sales::{FlashSaleService, NewFlashSale};
pub use orders::{OrderService, RevisionLine, RevisionOutcome, SkipReason, SkippedLine};
pub use wishlists::WishlistService;

use crate::clock::Clock;
use crate::config::CommerceConfig;
use crate::domain::aggregates::Product;
use crate::events::EventSink;
use crate::ids::ProductId;
use crate::store::{Store, StoreTx};
use crate::Result;

/// Collaborators every service and sweep is built from.
#[derive(Clone)]
pub struct Deps {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub events: Arc<dyn EventSink>,
    pub config: CommerceConfig,
}

impl std::fmt::Debug for Deps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deps").field("config", &self.config).finish_non_exhaustive()
    }
}

/// Locks the products in `ids` in ascending id order and returns the ones
/// that exist. Every writer touching several products locks through here.
pub(crate) async fn lock_products(tx: &mut dyn StoreTx, ids: &[ProductId]) -> Result<BTreeMap<ProductId, Product>> {
    let ordered: BTreeSet<ProductId> = ids.iter().copied().collect();
    let mut locked = BTreeMap::new();
    for id in ordered {
        if let Some(product) = tx.product_for_update(id).await? {
            locked.insert(id, product);
        }
    }
    Ok(locked)
}

/// All services over one set of collaborators.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub deps: Deps,
    pub catalog: CatalogService,
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub flash_sales: FlashSaleService,
    pub wishlists: WishlistService,
}

impl AppContext {
    pub fn new(deps: Deps) -> Self {
        Self {
            catalog: CatalogService::new(deps.clone()),
            carts: CartService::new(deps.clone()),
            checkout: CheckoutService::new(deps.clone()),
            orders: OrderService::new(deps.clone()),
            flash_sales: FlashSaleService::new(deps.clone()),
            wishlists: WishlistService::new(deps.clone()),
            deps,
        }
    }
}
