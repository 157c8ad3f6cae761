//! Pricing engine
//!
//! Cart writes, the re-pricing sweep, checkout and order revision all price
//! through here, so the price a user is shown is the price they are charged
//! (up to one re-pricing interval of staleness on cached cart lines).

use chrono::{DateTime, Utc};

use crate::domain::{aggregates::Product, value_objects::Money};

/// Price of one unit of `product` at `now`.
pub fn effective_unit_price(product: &Product, now: DateTime<Utc>) -> Money {
    if product.is_on_sale(now) {
        product.discounted_price()
    } else {
        product.base_price().clone()
    }
}

/// Price of `quantity` units of `product` at `now`.
pub fn line_price(product: &Product, quantity: u32, now: DateTime<Utc>) -> Money {
    effective_unit_price(product, now).multiply(quantity)
}
