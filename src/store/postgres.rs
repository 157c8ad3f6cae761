//! PostgreSQL store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, query, PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::domain::aggregates::{
    Address, CartItem, FlashSale, Order, OrderItem, OrderParts, OrderStatus, PaymentMethod, Product, ProductParts,
    SaleState, WishlistItem,
};
use crate::domain::value_objects::{Discount, Money, SaleWindow};
use crate::ids::{CartItemId, FlashSaleId, OrderId, OrderItemId, ProductId, UserId};

use super::{OrderFilter, Store, StoreError, StoreTx};

const PRODUCT_COLUMNS: &str = "id, name, category, base_price, currency, on_sale, discount, sale_start, sale_end, stock, sold, active, created_at";

const FLASH_SALES_SQL: &str = "SELECT f.id, f.name, f.start_date, f.end_date, f.discount, f.active, f.created_at, \
    COALESCE(array_agg(fp.product_id ORDER BY fp.position) FILTER (WHERE fp.product_id IS NOT NULL), '{}') AS product_ids \
    FROM flash_sales f LEFT JOIN flash_sale_products fp ON fp.flash_sale_id = f.id";

const ORDER_COLUMNS: &str = "id, order_number, user_id, status, payment_method, shipping_address, total, currency, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

fn count(row: &PgRow, col: &str) -> Result<u32, StoreError> {
    let value: i32 = row.try_get(col)?;
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{col} is negative: {value}")))
}

fn to_i32(value: u32, col: &str) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{col} out of range: {value}")))
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    let discount: i16 = row.try_get("discount")?;
    let discount = u8::try_from(discount).map_err(|_| StoreError::Corrupt(format!("discount out of range: {discount}")))?;
    let currency: String = row.try_get("currency")?;
    Ok(Product::restore(ProductParts {
        id: ProductId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        base_price: Money::new(row.try_get("base_price")?, &currency),
        sale: SaleState::from_columns(row.try_get("on_sale")?, discount, row.try_get("sale_start")?, row.try_get("sale_end")?),
        stock: count(row, "stock")?,
        sold: count(row, "sold")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    }))
}

fn flash_sale_from_row(row: &PgRow) -> Result<FlashSale, StoreError> {
    let window = SaleWindow::new(row.try_get("start_date")?, row.try_get("end_date")?)
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    let discount: i16 = row.try_get("discount")?;
    let discount = u8::try_from(discount).ok().and_then(|d| Discount::new(d).ok())
        .ok_or_else(|| StoreError::Corrupt(format!("flash sale discount out of range: {discount}")))?;
    let product_ids: Vec<Uuid> = row.try_get("product_ids")?;
    Ok(FlashSale::restore(
        FlashSaleId::from_uuid(row.try_get("id")?),
        row.try_get("name")?,
        window,
        discount,
        row.try_get("active")?,
        product_ids.into_iter().map(ProductId::from_uuid).collect(),
        row.try_get("created_at")?,
    ))
}

fn cart_item_from_row(row: &PgRow) -> Result<CartItem, StoreError> {
    let currency: String = row.try_get("currency")?;
    Ok(CartItem {
        id: CartItemId::from_uuid(row.try_get("id")?),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        quantity: count(row, "quantity")?,
        price: Money::new(row.try_get("price")?, &currency),
    })
}

fn wishlist_item_from_row(row: &PgRow) -> Result<WishlistItem, StoreError> {
    Ok(WishlistItem {
        id: row.try_get::<Uuid, _>("id")?.into(),
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        created_at: row.try_get("created_at")?,
    })
}

fn order_item_from_row(row: &PgRow) -> Result<OrderItem, StoreError> {
    let currency: String = row.try_get("currency")?;
    Ok(OrderItem {
        id: OrderItemId::from_uuid(row.try_get("id")?),
        order_id: OrderId::from_uuid(row.try_get("order_id")?),
        product_id: ProductId::from_uuid(row.try_get("product_id")?),
        quantity: count(row, "quantity")?,
        price: Money::new(row.try_get("price")?, &currency),
    })
}

fn order_parts_from_row(row: &PgRow) -> Result<OrderParts, StoreError> {
    let status: String = row.try_get("status")?;
    let payment_method: String = row.try_get("payment_method")?;
    let order_number: i64 = row.try_get("order_number")?;
    let currency: String = row.try_get("currency")?;
    Ok(OrderParts {
        id: OrderId::from_uuid(row.try_get("id")?),
        order_number: u64::try_from(order_number).map_err(|_| StoreError::Corrupt(format!("order number {order_number}")))?,
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        status: OrderStatus::parse(&status).ok_or_else(|| StoreError::Corrupt(format!("unknown order status {status}")))?,
        payment_method: PaymentMethod::parse(&payment_method)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown payment method {payment_method}")))?,
        shipping_address: row.try_get("shipping_address")?,
        items: vec![],
        total: Money::new(row.try_get("total")?, &currency),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl PgTx {
    async fn fetch_product(&mut self, sql: &str, id: ProductId) -> Result<Option<Product>, StoreError> {
        let row = query(sql).bind(id.into_uuid()).fetch_optional(&mut *self.tx).await?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn fetch_flash_sales(&mut self, id: Option<Uuid>) -> Result<Vec<FlashSale>, StoreError> {
        let sql = format!("{FLASH_SALES_SQL} WHERE ($1::uuid IS NULL OR f.id = $1) GROUP BY f.id ORDER BY f.seq");
        let rows = query(&sql).bind(id).fetch_all(&mut *self.tx).await?;
        rows.iter().map(flash_sale_from_row).collect()
    }

    async fn attach_items(&mut self, headers: Vec<OrderParts>) -> Result<Vec<Order>, StoreError> {
        let ids: Vec<Uuid> = headers.iter().map(|o| o.id.into_uuid()).collect();
        let rows = query("SELECT id, order_id, product_id, quantity, price, currency FROM order_items WHERE order_id = ANY($1) ORDER BY id")
            .bind(&ids)
            .fetch_all(&mut *self.tx)
            .await?;
        let items = rows.iter().map(order_item_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(headers
            .into_iter()
            .map(|mut parts| {
                parts.items = items.iter().filter(|i| i.order_id == parts.id).cloned().collect();
                Order::restore(parts)
            })
            .collect())
    }

    async fn write_product(&mut self, sql: &str, product: &Product) -> Result<(), StoreError> {
        let sale = product.sale_columns();
        query(sql)
            .bind(product.id().into_uuid())
            .bind(product.name())
            .bind(product.category())
            .bind(product.base_price().amount())
            .bind(product.base_price().currency())
            .bind(sale.on_sale)
            .bind(i16::from(sale.discount))
            .bind(sale.sale_start)
            .bind(sale.sale_end)
            .bind(sale.discounted_price.amount())
            .bind(to_i32(product.stock(), "stock")?)
            .bind(to_i32(product.sold(), "sold")?)
            .bind(product.is_active())
            .bind(product.created_at())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl StoreTx for PgTx {
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.fetch_product(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"), id).await
    }

    async fn product_for_update(&mut self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.fetch_product(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"), id).await
    }

    async fn products(&mut self) -> Result<Vec<Product>, StoreError> {
        let rows = query(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at, id")).fetch_all(&mut *self.tx).await?;
        rows.iter().map(product_from_row).collect()
    }

    async fn products_with_sale_ended_before(&mut self, now: DateTime<Utc>) -> Result<Vec<Product>, StoreError> {
        let rows = query(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE on_sale AND sale_end < $1 ORDER BY id"))
            .bind(now)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(product_from_row).collect()
    }

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError> {
        self.write_product(
            "INSERT INTO products (id, name, category, base_price, currency, on_sale, discount, sale_start, sale_end, discounted_price, stock, sold, active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, NOW())",
            product,
        )
        .await
    }

    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError> {
        self.write_product(
            "UPDATE products SET name = $2, category = $3, base_price = $4, currency = $5, on_sale = $6, discount = $7, sale_start = $8, \
             sale_end = $9, discounted_price = $10, stock = $11, sold = $12, active = $13, created_at = $14, updated_at = NOW() WHERE id = $1",
            product,
        )
        .await
    }

    async fn clear_expired_sale(&mut self, id: ProductId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let rows = query(
            "UPDATE products SET on_sale = FALSE, discount = 0, sale_start = NULL, sale_end = NULL, discounted_price = 0, updated_at = NOW() \
             WHERE id = $1 AND on_sale AND sale_end < $2",
        )
        .bind(id.into_uuid())
        .bind(now)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();
        Ok(rows > 0)
    }

    async fn flash_sales(&mut self) -> Result<Vec<FlashSale>, StoreError> {
        self.fetch_flash_sales(None).await
    }

    async fn flash_sale(&mut self, id: FlashSaleId) -> Result<Option<FlashSale>, StoreError> {
        Ok(self.fetch_flash_sales(Some(id.into_uuid())).await?.into_iter().next())
    }

    async fn insert_flash_sale(&mut self, sale: &FlashSale) -> Result<(), StoreError> {
        query("INSERT INTO flash_sales (id, name, start_date, end_date, discount, active, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)")
            .bind(sale.id.into_uuid())
            .bind(&sale.name)
            .bind(sale.window.start())
            .bind(sale.window.end())
            .bind(i16::from(sale.discount.percent()))
            .bind(sale.active)
            .bind(sale.created_at)
            .execute(&mut *self.tx)
            .await?;
        let products: Vec<Uuid> = sale.product_ids.iter().map(|p| p.into_uuid()).collect();
        query(
            "INSERT INTO flash_sale_products (flash_sale_id, product_id, position) \
             SELECT $1, p, ord::int FROM UNNEST($2::uuid[]) WITH ORDINALITY AS t(p, ord)",
        )
        .bind(sale.id.into_uuid())
        .bind(&products)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_flash_sale(&mut self, sale: &FlashSale) -> Result<(), StoreError> {
        query("UPDATE flash_sales SET name = $2, active = $3 WHERE id = $1")
            .bind(sale.id.into_uuid())
            .bind(&sale.name)
            .bind(sale.active)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_flash_sale(&mut self, id: FlashSaleId) -> Result<bool, StoreError> {
        let rows = query("DELETE FROM flash_sales WHERE id = $1").bind(id.into_uuid()).execute(&mut *self.tx).await?.rows_affected();
        Ok(rows > 0)
    }

    async fn cart_items(&mut self, user: UserId) -> Result<Vec<CartItem>, StoreError> {
        let rows = query("SELECT id, user_id, product_id, quantity, price, currency FROM cart_items WHERE user_id = $1 ORDER BY seq")
            .bind(user.into_uuid())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(cart_item_from_row).collect()
    }

    async fn all_cart_items(&mut self) -> Result<Vec<CartItem>, StoreError> {
        let rows = query("SELECT id, user_id, product_id, quantity, price, currency FROM cart_items ORDER BY seq").fetch_all(&mut *self.tx).await?;
        rows.iter().map(cart_item_from_row).collect()
    }

    async fn cart_item(&mut self, id: CartItemId) -> Result<Option<CartItem>, StoreError> {
        let row = query("SELECT id, user_id, product_id, quantity, price, currency FROM cart_items WHERE id = $1")
            .bind(id.into_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(cart_item_from_row).transpose()
    }

    async fn cart_item_for_product(&mut self, user: UserId, product: ProductId) -> Result<Option<CartItem>, StoreError> {
        let row = query("SELECT id, user_id, product_id, quantity, price, currency FROM cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user.into_uuid())
            .bind(product.into_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(cart_item_from_row).transpose()
    }

    async fn save_cart_item(&mut self, item: &CartItem) -> Result<(), StoreError> {
        query(
            "INSERT INTO cart_items (id, user_id, product_id, quantity, price, currency, updated_at) VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
             ON CONFLICT (id) DO UPDATE SET quantity = EXCLUDED.quantity, price = EXCLUDED.price, currency = EXCLUDED.currency, updated_at = NOW()",
        )
        .bind(item.id.into_uuid())
        .bind(item.user_id.into_uuid())
        .bind(item.product_id.into_uuid())
        .bind(to_i32(item.quantity, "quantity")?)
        .bind(item.price.amount())
        .bind(item.price.currency())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_cart_item_price(&mut self, item: &CartItem) -> Result<bool, StoreError> {
        let rows = query("UPDATE cart_items SET price = $2, currency = $3, updated_at = NOW() WHERE id = $1 AND quantity = $4")
            .bind(item.id.into_uuid())
            .bind(item.price.amount())
            .bind(item.price.currency())
            .bind(to_i32(item.quantity, "quantity")?)
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
        Ok(rows > 0)
    }

    async fn delete_cart_item(&mut self, id: CartItemId) -> Result<bool, StoreError> {
        let rows = query("DELETE FROM cart_items WHERE id = $1").bind(id.into_uuid()).execute(&mut *self.tx).await?.rows_affected();
        Ok(rows > 0)
    }

    async fn wishlist(&mut self, user: UserId) -> Result<Vec<WishlistItem>, StoreError> {
        let rows = query("SELECT id, user_id, product_id, created_at FROM wishlist_items WHERE user_id = $1 ORDER BY seq")
            .bind(user.into_uuid())
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(wishlist_item_from_row).collect()
    }

    async fn wishlist_item_for_product(&mut self, user: UserId, product: ProductId) -> Result<Option<WishlistItem>, StoreError> {
        let row = query("SELECT id, user_id, product_id, created_at FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
            .bind(user.into_uuid())
            .bind(product.into_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(wishlist_item_from_row).transpose()
    }

    async fn insert_wishlist_item(&mut self, item: &WishlistItem) -> Result<(), StoreError> {
        query("INSERT INTO wishlist_items (id, user_id, product_id, created_at) VALUES ($1, $2, $3, $4)")
            .bind(item.id.into_uuid())
            .bind(item.user_id.into_uuid())
            .bind(item.product_id.into_uuid())
            .bind(item.created_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_wishlist_item(&mut self, user: UserId, product: ProductId) -> Result<bool, StoreError> {
        let rows = query("DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
            .bind(user.into_uuid())
            .bind(product.into_uuid())
            .execute(&mut *self.tx)
            .await?
            .rows_affected();
        Ok(rows > 0)
    }

    async fn address(&mut self, user: UserId) -> Result<Option<Address>, StoreError> {
        let row = query("SELECT recipient, street, city, state, postal_code, country, phone FROM addresses WHERE user_id = $1")
            .bind(user.into_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        let Some(row) = row else { return Ok(None) };
        Ok(Some(Address {
            recipient: row.try_get("recipient")?,
            street: row.try_get("street")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
            postal_code: row.try_get("postal_code")?,
            country: row.try_get("country")?,
            phone: row.try_get("phone")?,
        }))
    }

    async fn save_address(&mut self, user: UserId, address: &Address) -> Result<(), StoreError> {
        query(
            "INSERT INTO addresses (user_id, recipient, street, city, state, postal_code, country, phone) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (user_id) DO UPDATE SET recipient = EXCLUDED.recipient, street = EXCLUDED.street, city = EXCLUDED.city, \
             state = EXCLUDED.state, postal_code = EXCLUDED.postal_code, country = EXCLUDED.country, phone = EXCLUDED.phone",
        )
        .bind(user.into_uuid())
        .bind(&address.recipient)
        .bind(&address.street)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.postal_code)
        .bind(&address.country)
        .bind(&address.phone)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn next_order_number(&mut self) -> Result<u64, StoreError> {
        let (next,): (i64,) = sqlx::query_as("SELECT nextval('order_number_seq')").fetch_one(&mut *self.tx).await?;
        u64::try_from(next).map_err(|_| StoreError::Corrupt(format!("order number {next}")))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let order_number = i64::try_from(order.order_number()).map_err(|_| StoreError::Corrupt(format!("order number {}", order.order_number())))?;
        query(
            "INSERT INTO orders (id, order_number, user_id, status, payment_method, shipping_address, total, currency, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(order.id().into_uuid())
        .bind(order_number)
        .bind(order.user_id().into_uuid())
        .bind(order.status().as_str())
        .bind(order.payment_method().as_str())
        .bind(order.shipping_address())
        .bind(order.total().amount())
        .bind(order.total().currency())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        query("UPDATE orders SET status = $2, total = $3, updated_at = $4 WHERE id = $1")
            .bind(order.id().into_uuid())
            .bind(order.status().as_str())
            .bind(order.total().amount())
            .bind(order.updated_at())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn save_order_item(&mut self, item: &OrderItem) -> Result<(), StoreError> {
        query(
            "INSERT INTO order_items (id, order_id, product_id, quantity, price, currency) VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET quantity = EXCLUDED.quantity, price = EXCLUDED.price, currency = EXCLUDED.currency",
        )
        .bind(item.id.into_uuid())
        .bind(item.order_id.into_uuid())
        .bind(item.product_id.into_uuid())
        .bind(to_i32(item.quantity, "quantity")?)
        .bind(item.price.amount())
        .bind(item.price.currency())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_order_item(&mut self, id: OrderItemId) -> Result<bool, StoreError> {
        let rows = query("DELETE FROM order_items WHERE id = $1").bind(id.into_uuid()).execute(&mut *self.tx).await?.rows_affected();
        Ok(rows > 0)
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row = query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.into_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let header = order_parts_from_row(&row)?;
        Ok(self.attach_items(vec![header]).await?.into_iter().next())
    }

    async fn orders(&mut self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE ($1::uuid IS NULL OR user_id = $1) AND ($2::text IS NULL OR status = $2) \
             AND ($3::timestamptz IS NULL OR created_at >= $3) AND ($4::timestamptz IS NULL OR created_at < $4) \
             ORDER BY created_at DESC, order_number DESC"
        );
        let rows = query(&sql)
            .bind(filter.user_id.map(UserId::into_uuid))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.created_from)
            .bind(filter.created_to)
            .fetch_all(&mut *self.tx)
            .await?;
        let headers = rows.iter().map(order_parts_from_row).collect::<Result<Vec<_>, _>>()?;
        self.attach_items(headers).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}
