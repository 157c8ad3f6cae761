//! HTTP API
//!
//! JSON over axum. The caller's identity arrives in the `x-user-id` header;
//! endpoints acting on a user's cart, address or wishlist require it.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::{Address, Cart, CartItem, FlashSale, Order, OrderItem, OrderStatus, PaymentMethod, Product, WishlistItem};
use crate::domain::value_objects::Money;
use crate::ids::{CartItemId, FlashSaleId, OrderId, ProductId, UserId};
use crate::pricing;
use crate::services::{AppContext, NewFlashSale, NewProduct, ProductUpdate, RevisionLine, SkippedLine};
use crate::store::OrderFilter;
use crate::EcommerceError;

pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<AppContext>,
}

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-checkout"})) }))
        .route("/api/v1/products", get(list_products).post(create_product))
        .route("/api/v1/products/:id", get(get_product).put(update_product))
        .route("/api/v1/cart", get(get_cart))
        .route("/api/v1/cart/items", post(add_to_cart))
        .route("/api/v1/cart/items/:id", put(set_cart_quantity).delete(remove_cart_item))
        .route("/api/v1/address", get(get_address).put(save_address))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/status", put(set_order_status))
        .route("/api/v1/orders/:id/items", put(revise_order))
        .route("/api/v1/flash-sales", get(list_flash_sales).post(create_flash_sale))
        .route("/api/v1/flash-sales/active", get(active_flash_sale))
        .route("/api/v1/flash-sales/:id", get(get_flash_sale).delete(delete_flash_sale))
        .route("/api/v1/flash-sales/:id/toggle", post(toggle_flash_sale))
        .route("/api/v1/wishlist", get(get_wishlist).post(add_to_wishlist))
        .route("/api/v1/wishlist/:product_id", axum::routing::delete(remove_from_wishlist))
        .with_state(AppState { ctx })
}

// =============================================================================
// Errors and identity
// =============================================================================

#[derive(Debug)]
pub struct ApiError(EcommerceError);

impl From<EcommerceError> for ApiError {
    fn from(e: EcommerceError) -> Self {
        Self(e)
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped: Option<&'a [SkippedLine]>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EcommerceError::NotFound { .. } => StatusCode::NOT_FOUND,
            EcommerceError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            EcommerceError::Unauthenticated => StatusCode::UNAUTHORIZED,
            EcommerceError::EmptyCart | EcommerceError::MissingAddress => StatusCode::UNPROCESSABLE_ENTITY,
            EcommerceError::Inactive { .. }
            | EcommerceError::OutOfStock { .. }
            | EcommerceError::LowStock { .. }
            | EcommerceError::Conflict(_)
            | EcommerceError::InvalidTransition { .. }
            | EcommerceError::OrderNotPending(_)
            | EcommerceError::AllItemsSkippedLowStock { .. } => StatusCode::CONFLICT,
            EcommerceError::TransactionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match &self.0 {
            EcommerceError::TransactionFailed(e) => {
                tracing::error!(error = %e, "request failed");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let skipped = match &self.0 {
            EcommerceError::AllItemsSkippedLowStock { skipped } => Some(skipped.as_slice()),
            _ => None,
        };
        (status, Json(ErrorBody { error: self.0.code(), message, skipped })).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// The caller named by the `x-user-id` header, if any.
pub struct CurrentUser(pub Option<UserId>);

impl CurrentUser {
    fn require(self) -> ApiResult<UserId> {
        self.0.ok_or(ApiError(EcommerceError::Unauthenticated))
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(USER_HEADER) else { return Ok(Self(None)) };
        value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .map(|id| Self(Some(id)))
            .ok_or_else(|| ApiError(EcommerceError::ValidationFailed(format!("{USER_HEADER} is not a valid id"))))
    }
}

// =============================================================================
// Views
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ProductView {
    pub id: ProductId,
    pub name: String,
    pub category: Option<String>,
    pub base_price: Money,
    /// Unit price charged right now.
    pub price: Money,
    pub on_sale: bool,
    pub discount: u8,
    pub sale_start: Option<DateTime<Utc>>,
    pub sale_end: Option<DateTime<Utc>>,
    /// Equals `price`; the base price whenever no sale is live.
    pub discounted_price: Money,
    pub stock: u32,
    pub sold: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl ProductView {
    fn new(product: &Product, now: DateTime<Utc>) -> Self {
        let sale = product.sale_columns();
        let price = pricing::effective_unit_price(product, now);
        Self {
            id: product.id(), name: product.name().to_string(), category: product.category().map(str::to_string),
            base_price: product.base_price().clone(), discounted_price: price.clone(), price,
            on_sale: product.is_on_sale(now), discount: sale.discount, sale_start: sale.sale_start, sale_end: sale.sale_end,
            stock: product.stock(), sold: product.sold(),
            active: product.is_active(), created_at: product.created_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: OrderId,
    pub order_number: u64,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub shipping_address: String,
    pub items: Vec<OrderItem>,
    pub total: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderView {
    fn from(o: &Order) -> Self {
        Self {
            id: o.id(), order_number: o.order_number(), user_id: o.user_id(), status: o.status(),
            payment_method: o.payment_method(), shipping_address: o.shipping_address().to_string(),
            items: o.items().to_vec(), total: o.total().clone(), created_at: o.created_at(), updated_at: o.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FlashSaleView {
    pub id: FlashSaleId,
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub discount: u8,
    pub active: bool,
    pub running: bool,
    pub product_ids: Vec<ProductId>,
    pub created_at: DateTime<Utc>,
}

impl FlashSaleView {
    fn new(sale: &FlashSale, now: DateTime<Utc>) -> Self {
        Self {
            id: sale.id, name: sale.name.clone(), start: sale.window.start(), end: sale.window.end(),
            discount: sale.discount.percent(), active: sale.active, running: sale.is_running_at(now),
            product_ids: sale.product_ids.clone(), created_at: sale.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RevisionView {
    pub order: OrderView,
    pub skipped: Vec<SkippedLine>,
}

fn clock_now(s: &AppState) -> DateTime<Utc> {
    s.ctx.deps.clock.now()
}

// =============================================================================
// Products
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ProductListParams {
    #[serde(default)]
    pub include_inactive: bool,
}

async fn list_products(State(s): State<AppState>, Query(p): Query<ProductListParams>) -> ApiResult<Json<Vec<ProductView>>> {
    let products = s.ctx.catalog.list(p.include_inactive).await?;
    let now = clock_now(&s);
    Ok(Json(products.iter().map(|p| ProductView::new(p, now)).collect()))
}

async fn create_product(State(s): State<AppState>, Json(r): Json<NewProduct>) -> ApiResult<(StatusCode, Json<ProductView>)> {
    let product = s.ctx.catalog.create(r).await?;
    Ok((StatusCode::CREATED, Json(ProductView::new(&product, clock_now(&s)))))
}

async fn get_product(State(s): State<AppState>, Path(id): Path<ProductId>) -> ApiResult<Json<ProductView>> {
    let product = s.ctx.catalog.get(id).await?;
    Ok(Json(ProductView::new(&product, clock_now(&s))))
}

async fn update_product(State(s): State<AppState>, Path(id): Path<ProductId>, Json(r): Json<ProductUpdate>) -> ApiResult<Json<ProductView>> {
    let product = s.ctx.catalog.update(id, r).await?;
    Ok(Json(ProductView::new(&product, clock_now(&s))))
}

// =============================================================================
// Cart, address, checkout
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: u32,
}

async fn get_cart(State(s): State<AppState>, user: CurrentUser) -> ApiResult<Json<Cart>> {
    Ok(Json(s.ctx.carts.cart(user.require()?).await?))
}

async fn add_to_cart(State(s): State<AppState>, user: CurrentUser, Json(r): Json<AddToCartRequest>) -> ApiResult<(StatusCode, Json<CartItem>)> {
    let item = s.ctx.carts.add(user.require()?, r.product_id, r.quantity).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn set_cart_quantity(State(s): State<AppState>, user: CurrentUser, Path(id): Path<CartItemId>, Json(r): Json<QuantityRequest>) -> ApiResult<Json<CartItem>> {
    Ok(Json(s.ctx.carts.set_quantity(user.require()?, id, r.quantity).await?))
}

async fn remove_cart_item(State(s): State<AppState>, user: CurrentUser, Path(id): Path<CartItemId>) -> ApiResult<StatusCode> {
    s.ctx.carts.remove(user.require()?, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_address(State(s): State<AppState>, user: CurrentUser) -> ApiResult<Json<Address>> {
    let user = user.require()?;
    s.ctx.checkout.address(user).await?.map(Json).ok_or_else(|| EcommerceError::not_found("address", user).into())
}

async fn save_address(State(s): State<AppState>, user: CurrentUser, Json(r): Json<Address>) -> ApiResult<Json<Address>> {
    Ok(Json(s.ctx.checkout.save_address(user.require()?, r).await?))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

async fn checkout(State(s): State<AppState>, user: CurrentUser, Json(r): Json<CheckoutRequest>) -> ApiResult<(StatusCode, Json<OrderView>)> {
    let order = s.ctx.checkout.checkout(user.0, r.payment_method).await?;
    Ok((StatusCode::CREATED, Json(OrderView::from(&order))))
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct OrderListParams {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct ReviseRequest {
    pub items: Vec<RevisionLine>,
}

async fn list_orders(State(s): State<AppState>, Query(p): Query<OrderListParams>) -> ApiResult<Json<Vec<OrderView>>> {
    let filter = OrderFilter { user_id: p.user_id, status: p.status, created_from: p.from, created_to: p.to };
    let orders = s.ctx.orders.list(&filter).await?;
    Ok(Json(orders.iter().map(OrderView::from).collect()))
}

async fn get_order(State(s): State<AppState>, Path(id): Path<OrderId>) -> ApiResult<Json<OrderView>> {
    Ok(Json(OrderView::from(&s.ctx.orders.get(id).await?)))
}

async fn set_order_status(State(s): State<AppState>, Path(id): Path<OrderId>, Json(r): Json<StatusRequest>) -> ApiResult<Json<OrderView>> {
    Ok(Json(OrderView::from(&s.ctx.orders.set_status(id, r.status).await?)))
}

async fn revise_order(State(s): State<AppState>, Path(id): Path<OrderId>, Json(r): Json<ReviseRequest>) -> ApiResult<Json<RevisionView>> {
    let outcome = s.ctx.orders.revise(id, r.items).await?;
    Ok(Json(RevisionView { order: OrderView::from(&outcome.order), skipped: outcome.skipped }))
}

// =============================================================================
// Flash sales
// =============================================================================

async fn list_flash_sales(State(s): State<AppState>) -> ApiResult<Json<Vec<FlashSaleView>>> {
    let now = clock_now(&s);
    Ok(Json(s.ctx.flash_sales.list().await?.iter().map(|f| FlashSaleView::new(f, now)).collect()))
}

async fn create_flash_sale(State(s): State<AppState>, Json(r): Json<NewFlashSale>) -> ApiResult<(StatusCode, Json<FlashSaleView>)> {
    let sale = s.ctx.flash_sales.create(r).await?;
    Ok((StatusCode::CREATED, Json(FlashSaleView::new(&sale, clock_now(&s)))))
}

async fn active_flash_sale(State(s): State<AppState>) -> ApiResult<Json<Option<FlashSaleView>>> {
    let now = clock_now(&s);
    Ok(Json(s.ctx.flash_sales.active().await?.map(|f| FlashSaleView::new(&f, now))))
}

async fn get_flash_sale(State(s): State<AppState>, Path(id): Path<FlashSaleId>) -> ApiResult<Json<FlashSaleView>> {
    Ok(Json(FlashSaleView::new(&s.ctx.flash_sales.get(id).await?, clock_now(&s))))
}

async fn toggle_flash_sale(State(s): State<AppState>, Path(id): Path<FlashSaleId>) -> ApiResult<Json<FlashSaleView>> {
    Ok(Json(FlashSaleView::new(&s.ctx.flash_sales.toggle(id).await?, clock_now(&s))))
}

async fn delete_flash_sale(State(s): State<AppState>, Path(id): Path<FlashSaleId>) -> ApiResult<StatusCode> {
    s.ctx.flash_sales.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Wishlist
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct WishlistRequest {
    pub product_id: ProductId,
}

async fn get_wishlist(State(s): State<AppState>, user: CurrentUser) -> ApiResult<Json<Vec<ProductView>>> {
    let products = s.ctx.wishlists.list(user.require()?).await?;
    let now = clock_now(&s);
    Ok(Json(products.iter().map(|p| ProductView::new(p, now)).collect()))
}

async fn add_to_wishlist(State(s): State<AppState>, user: CurrentUser, Json(r): Json<WishlistRequest>) -> ApiResult<(StatusCode, Json<WishlistItem>)> {
    let item = s.ctx.wishlists.add(user.require()?, r.product_id).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn remove_from_wishlist(State(s): State<AppState>, user: CurrentUser, Path(product_id): Path<ProductId>) -> ApiResult<StatusCode> {
    s.ctx.wishlists.remove(user.require()?, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use testresult::TestResult;
    use tower::ServiceExt;

    use super::*;
    use crate::test_support::{address, Harness};

    fn app(h: &Harness) -> Router {
        router(Arc::new(h.ctx.clone()))
    }

    async fn send(app: &Router, method: &str, uri: &str, user: Option<UserId>, body: Option<Value>) -> TestResult<(StatusCode, Value)> {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            req = req.header(USER_HEADER, user.to_string());
        }
        let req = match body {
            Some(body) => req.header(header::CONTENT_TYPE, "application/json").body(Body::from(serde_json::to_vec(&body)?))?,
            None => req.body(Body::empty())?,
        };
        let res = app.clone().oneshot(req).await?;
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
        Ok((status, value))
    }

    #[tokio::test]
    async fn health() -> TestResult {
        let h = Harness::new();
        let (status, body) = send(&app(&h), "GET", "/health", None, None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        Ok(())
    }

    #[tokio::test]
    async fn create_and_fetch_product() -> TestResult {
        let h = Harness::new();
        let app = app(&h);
        let (status, created) = send(&app, "POST", "/api/v1/products", None, Some(json!({"name": "Lamp", "base_price": "25.50", "stock": 7}))).await?;
        assert_eq!(status, StatusCode::CREATED);

        let id = created["id"].as_str().unwrap_or_default().to_string();
        let (status, fetched) = send(&app, "GET", &format!("/api/v1/products/{id}"), None, None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["name"], "Lamp");
        assert_eq!(fetched["price"]["amount"], "25.50");
        assert_eq!(fetched["on_sale"], false);

        let (status, body) = send(&app, "GET", &format!("/api/v1/products/{}", ProductId::generate()), None, None).await?;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
        Ok(())
    }

    #[tokio::test]
    async fn upcoming_sale_shows_base_price() -> TestResult {
        let h = Harness::new();
        let app = app(&h);
        let product = h.product("Desk", 100, 5).await;
        let start = h.clock_now() + chrono::Duration::hours(1);
        let sale = NewFlashSale { name: "Evening".into(), start, end: start + chrono::Duration::hours(1), discount: 20, product_ids: vec![product.id()] };
        h.ctx.flash_sales.create(sale).await?;
        let uri = format!("/api/v1/products/{}", product.id());

        let (_, upcoming) = send(&app, "GET", &uri, None, None).await?;
        assert_eq!(upcoming["on_sale"], false);
        assert_eq!(upcoming["discounted_price"], upcoming["base_price"]);
        assert_eq!(upcoming["price"], upcoming["base_price"]);

        h.clock.advance(chrono::Duration::minutes(90));
        let (_, live) = send(&app, "GET", &uri, None, None).await?;
        assert_eq!(live["on_sale"], true);
        assert_eq!(live["discounted_price"], live["price"]);
        assert_ne!(live["price"], live["base_price"]);
        Ok(())
    }

    #[tokio::test]
    async fn checkout_requires_identity() -> TestResult {
        let h = Harness::new();
        let (status, body) = send(&app(&h), "POST", "/api/v1/checkout", None, Some(json!({}))).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "UNAUTHENTICATED");

        let (status, _) = send(&app(&h), "GET", "/api/v1/cart", None, None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn cart_to_order_flow() -> TestResult {
        let h = Harness::new();
        let app = app(&h);
        let product = h.product("Chair", 40, 6).await;

        let (status, _) = send(&app, "PUT", "/api/v1/address", Some(h.user), Some(serde_json::to_value(address())?)).await?;
        assert_eq!(status, StatusCode::OK);
        let (status, item) = send(&app, "POST", "/api/v1/cart/items", Some(h.user), Some(json!({"product_id": product.id(), "quantity": 2}))).await?;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(item["price"]["amount"], "80");

        let (status, order) = send(&app, "POST", "/api/v1/checkout", Some(h.user), Some(json!({"payment_method": "card"}))).await?;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order["order_number"], 1001);
        assert_eq!(order["status"], "pending");
        assert_eq!(order["payment_method"], "card");

        let (_, cart) = send(&app, "GET", "/api/v1/cart", Some(h.user), None).await?;
        assert_eq!(cart["lines"].as_array().map(Vec::len), Some(0));

        let (status, orders) = send(&app, "GET", "/api/v1/orders?status=pending", None, None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(orders.as_array().map(Vec::len), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn low_stock_checkout_is_a_conflict() -> TestResult {
        let h = Harness::new();
        let app = app(&h);
        h.save_address().await;
        let product = h.product("Chair", 40, 4).await;
        h.ctx.carts.add(h.user, product.id(), 2).await?;

        let (status, body) = send(&app, "POST", "/api/v1/checkout", Some(h.user), Some(json!({}))).await?;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "LOW_STOCK");
        Ok(())
    }

    #[tokio::test]
    async fn fully_skipped_revision_reports_lines() -> TestResult {
        let h = Harness::new();
        let app = app(&h);
        h.save_address().await;
        let chair = h.product("Chair", 40, 10).await;
        let rug = h.product("Rug", 90, 0).await;
        h.ctx.carts.add(h.user, chair.id(), 1).await?;
        let order = h.ctx.checkout.checkout(Some(h.user), PaymentMethod::Card).await?;

        let (status, body) = send(
            &app,
            "PUT",
            &format!("/api/v1/orders/{}/items", order.id()),
            None,
            Some(json!({"items": [{"product_id": rug.id(), "quantity": 1}]})),
        )
        .await?;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "ALL_ITEMS_SKIPPED_LOW_STOCK");
        assert_eq!(body["skipped"][0]["reason"], "low_stock");
        assert_eq!(body["skipped"][0]["available"], 0);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_wishlist_entry_conflicts() -> TestResult {
        let h = Harness::new();
        let app = app(&h);
        let product = h.product("Scarf", 25, 3).await;
        let body = json!({"product_id": product.id()});

        let (status, _) = send(&app, "POST", "/api/v1/wishlist", Some(h.user), Some(body.clone())).await?;
        assert_eq!(status, StatusCode::CREATED);
        let (status, err) = send(&app, "POST", "/api/v1/wishlist", Some(h.user), Some(body)).await?;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err["error"], "CONFLICT");
        Ok(())
    }
}
