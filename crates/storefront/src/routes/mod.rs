//! HTTP route handlers for the storefront API.
//!
//! All routes are scoped under `/api/{org}`, where `org` is the
//! organization slug. Identity is optional nearly everywhere: guests can
//! browse, fill carts, and place orders; a bearer session token is required
//! only for loyalty redemption and balance reads.
//!
//! # Route Structure
//!
//! ```text
//! GET    /api/{org}/catalog                              - Menu listing (filterable)
//!
//! # Device-local cart (keyed by the X-Device-Id header)
//! GET    /api/{org}/cart                                 - Current cart
//! DELETE /api/{org}/cart                                 - Clear cart
//! POST   /api/{org}/cart/items                           - Add item
//! PATCH  /api/{org}/cart/items/{key}                     - Adjust quantity (delta)
//! DELETE /api/{org}/cart/items/{key}                     - Remove line
//! POST   /api/{org}/cart/join/{cart_id}                  - Switch to a shared cart
//!
//! # Shared carts
//! POST   /api/{org}/shared-carts                         - Create
//! GET    /api/{org}/shared-carts/{cart_id}               - Current lines
//! POST   /api/{org}/shared-carts/{cart_id}/items         - Add item
//! PATCH  /api/{org}/shared-carts/{cart_id}/items/{key}   - Adjust quantity (delta)
//! DELETE /api/{org}/shared-carts/{cart_id}/items/{key}   - Remove line
//! GET    /api/{org}/shared-carts/{cart_id}/events        - Line changes (SSE)
//!
//! # Orders
//! POST   /api/{org}/orders                               - Checkout
//! GET    /api/{org}/orders/{id}                          - Detail (owner or ?phone=)
//! GET    /api/{org}/orders/{id}/events                   - Status changes (SSE)
//!
//! # Loyalty (requires auth)
//! GET    /api/{org}/loyalty/balance                      - Current balance
//! GET    /api/{org}/loyalty/history                      - Ledger rows, newest first
//! ```

pub mod carts;
pub mod catalog;
pub mod loyalty;
pub mod orders;

use axum::http::HeaderMap;
use axum::{
    Router,
    routing::{get, post},
};
use quiosque_core::OrgId;

use crate::error::AppError;
use crate::state::AppState;

/// Create the device-local cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(carts::get_local).delete(carts::clear_local))
        .route("/items", post(carts::add_local))
        .route(
            "/items/{key}",
            axum::routing::patch(carts::update_local).delete(carts::remove_local),
        )
        .route("/join/{cart_id}", post(carts::join_shared))
}

/// Create the shared cart routes router.
pub fn shared_cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(carts::create_shared))
        .route("/{cart_id}", get(carts::get_shared))
        .route("/{cart_id}/items", post(carts::add_shared))
        .route(
            "/{cart_id}/items/{key}",
            axum::routing::patch(carts::update_shared).delete(carts::remove_shared),
        )
        .route("/{cart_id}/events", get(carts::shared_events))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(orders::create))
        .route("/{id}", get(orders::detail))
        .route("/{id}/events", get(orders::events))
}

/// Create all routes for the storefront API.
pub fn routes() -> Router<AppState> {
    Router::new().nest(
        "/api/{org}",
        Router::new()
            .route("/catalog", get(catalog::list))
            .nest("/cart", cart_routes())
            .nest("/shared-carts", shared_cart_routes())
            .nest("/orders", order_routes())
            .route("/loyalty/balance", get(loyalty::balance))
            .route("/loyalty/history", get(loyalty::history)),
    )
}

/// Parse the organization slug from the path.
pub(crate) fn parse_org(org: &str) -> Result<OrgId, AppError> {
    OrgId::parse(org).map_err(|e| AppError::BadRequest(format!("invalid organization: {e}")))
}

/// The caller's device identifier, required for local-cart routes.
pub(crate) fn device_id(headers: &HeaderMap) -> Result<String, AppError> {
    let value = headers
        .get("x-device-id")
        .ok_or_else(|| AppError::BadRequest("missing X-Device-Id header".to_owned()))?;
    let value = value
        .to_str()
        .map_err(|_| AppError::BadRequest("malformed X-Device-Id header".to_owned()))?;
    if value.is_empty() || value.len() > 128 {
        return Err(AppError::BadRequest(
            "X-Device-Id must be 1-128 characters".to_owned(),
        ));
    }
    Ok(value.to_owned())
}
