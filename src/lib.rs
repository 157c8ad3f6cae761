//! OpenSASE Checkout
//!
//! Pricing and checkout consistency engine for the OpenSASE e-commerce
//! service: keeps product prices, sale state, cached cart line totals and
//! order totals consistent across sale activation, stock changes and order
//! edits.
//!
//! ## Features
//! - Catalog with tagged sale state and stock / sold counters
//! - Flash sales with exclusive activation
//! - Carts with cached line prices and periodic re-pricing
//! - All-or-nothing checkout with a minimum stock guard
//! - Admin order revision with per-line skip reporting
//! - Wishlists

pub mod clock;
pub mod config;
pub mod domain;
pub mod events;
pub mod http;
pub mod ids;
pub mod pricing;
pub mod scheduler;
pub mod services;
pub mod store;

use thiserror::Error;

use crate::domain::aggregates::{OrderError, OrderStatus, ProductError};
use crate::domain::value_objects::MoneyError;
use crate::ids::ProductId;
use crate::services::orders::SkippedLine;
use crate::store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} is inactive: {id}")]
    Inactive { entity: &'static str, id: String },

    #[error("Out of stock for {product_id}: requested {requested}, available {available}")]
    OutOfStock { product_id: ProductId, requested: u32, available: u32 },

    #[error("Low stock for {product_id}: {available} left, checkout requires at least {threshold}")]
    LowStock { product_id: ProductId, available: u32, threshold: u32 },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("No saved shipping address")]
    MissingAddress,

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order is {0}; only pending orders can change")]
    OrderNotPending(OrderStatus),

    #[error("All {} submitted items were skipped for low stock", skipped.len())]
    AllItemsSkippedLowStock { skipped: Vec<SkippedLine> },

    #[error("Transaction failed: {0}")]
    TransactionFailed(#[from] StoreError),
}

impl EcommerceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    pub fn inactive(entity: &'static str, id: impl ToString) -> Self {
        Self::Inactive { entity, id: id.to_string() }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Inactive { .. } => "INACTIVE",
            Self::OutOfStock { .. } => "OUT_OF_STOCK",
            Self::LowStock { .. } => "LOW_STOCK",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::Conflict(_) => "CONFLICT",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::EmptyCart => "EMPTY_CART",
            Self::MissingAddress => "MISSING_ADDRESS",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::OrderNotPending(_) => "ORDER_NOT_PENDING",
            Self::AllItemsSkippedLowStock { .. } => "ALL_ITEMS_SKIPPED_LOW_STOCK",
            Self::TransactionFailed(_) => "TRANSACTION_FAILED",
        }
    }
}

impl From<MoneyError> for EcommerceError {
    fn from(e: MoneyError) -> Self {
        Self::ValidationFailed(e.to_string())
    }
}

impl From<OrderError> for EcommerceError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NoItems => Self::EmptyCart,
            OrderError::NotPending(status) => Self::OrderNotPending(status),
            OrderError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
            OrderError::Money(e) => e.into(),
        }
    }
}

impl From<validator::ValidationErrors> for EcommerceError {
    fn from(e: validator::ValidationErrors) -> Self {
        Self::ValidationFailed(e.to_string())
    }
}

/// Maps an aggregate stock refusal onto the product it concerns.
pub(crate) fn out_of_stock(product_id: ProductId, e: ProductError) -> EcommerceError {
    match e {
        ProductError::InsufficientStock { requested, available } => EcommerceError::OutOfStock { product_id, requested, available },
    }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;

#[cfg(test)]
pub(crate) mod test_support;
