//! Aggregates module
pub mod product;
pub mod flash_sale;
pub mod order;
pub mod cart;
pub mod wishlist;

pub use product::{Product, ProductError, ProductParts, SaleColumns, SaleState};
pub use flash_sale::FlashSale;
pub use order::{Address, Order, OrderError, OrderItem, OrderParts, OrderStatus, PaymentMethod};
pub use cart::{Cart, CartItem, CartLine};
pub use wishlist::WishlistItem;
