//! Wishlist rows

use chrono::{DateTime, Utc};
use serde::Serialize;
use crate::ids::{ProductId, UserId, WishlistItemId};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WishlistItem {
    pub id: WishlistItemId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub created_at: DateTime<Utc>,
}
