//! Checkout
//!
//! Turns a user's cart into an order in one transaction. Every product is
//! locked and checked against the stock guard before anything is written;
//! any failure after that rolls the whole order back.

use validator::Validate;

use crate::domain::aggregates::{Address, Order, PaymentMethod};
use crate::ids::{ProductId, UserId};
use crate::{out_of_stock, EcommerceError, Result};

use super::{lock_products, Deps};

#[derive(Debug, Clone)]
pub struct CheckoutService {
    deps: Deps,
}

impl CheckoutService {
    pub fn new(deps: Deps) -> Self {
        Self { deps }
    }

    /// Places an order for everything in the user's cart at the cached line
    /// prices, moves the quantities from stock to sold and empties the cart.
    pub async fn checkout(&self, user: Option<UserId>, payment_method: PaymentMethod) -> Result<Order> {
        let user = user.ok_or(EcommerceError::Unauthenticated)?;
        let threshold = self.deps.config.checkout_min_stock;
        let now = self.deps.clock.now();

        let mut tx = self.deps.store.begin().await?;
        let items = tx.cart_items(user).await?;
        if items.is_empty() {
            return Err(EcommerceError::EmptyCart);
        }
        let address = tx.address(user).await?.ok_or(EcommerceError::MissingAddress)?;

        let wanted: Vec<ProductId> = items.iter().map(|i| i.product_id).collect();
        let mut products = lock_products(&mut *tx, &wanted).await?;
        for item in &items {
            let product = products.get(&item.product_id).ok_or_else(|| EcommerceError::not_found("product", item.product_id))?;
            if !product.is_active() {
                return Err(EcommerceError::inactive("product", item.product_id));
            }
            if product.stock() < threshold {
                tracing::info!(%user, product_id = %item.product_id, stock = product.stock(), threshold, "checkout refused: low stock");
                return Err(EcommerceError::LowStock { product_id: item.product_id, available: product.stock(), threshold });
            }
            if product.stock() < item.quantity {
                return Err(EcommerceError::OutOfStock { product_id: item.product_id, requested: item.quantity, available: product.stock() });
            }
        }

        let number = tx.next_order_number().await?;
        let mut order = Order::create(number, user, payment_method, address.format(), &self.deps.config.currency, now);
        for item in &items {
            order.add_item(item.product_id, item.quantity, item.price.clone())?;
        }
        order.placed()?;
        tx.insert_order(&order).await?;

        let mut events = Vec::new();
        for (cart_item, order_item) in items.iter().zip(order.items()) {
            tx.save_order_item(order_item).await?;
            let product = products.get_mut(&cart_item.product_id).ok_or_else(|| EcommerceError::not_found("product", cart_item.product_id))?;
            product.sell(cart_item.quantity).map_err(|e| out_of_stock(cart_item.product_id, e))?;
            tx.update_product(product).await?;
            tx.delete_cart_item(cart_item.id).await?;
            events.extend(product.take_events());
        }

        tx.commit().await?;

        events.extend(order.take_events());
        self.deps.events.publish(events).await;
        tracing::info!(order_id = %order.id(), order_number = order.order_number(), %user, total = %order.total(), "order placed");
        Ok(order)
    }

    pub async fn save_address(&self, user: UserId, address: Address) -> Result<Address> {
        address.validate()?;
        let mut tx = self.deps.store.begin().await?;
        tx.save_address(user, &address).await?;
        tx.commit().await?;
        Ok(address)
    }

    pub async fn address(&self, user: UserId) -> Result<Option<Address>> {
        let mut tx = self.deps.store.begin().await?;
        Ok(tx.address(user).await?)
    }
}
