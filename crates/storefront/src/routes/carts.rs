//! Cart handlers, local and shared.
//!
//! Local carts are keyed by the `X-Device-Id` header and carry no identity;
//! shared carts are addressed by id and record which participant added each
//! line. Add-to-cart re-reads the product row so the priced snapshot going
//! into the line is always current, whatever the client claims.

use std::convert::Infallible;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use quiosque_core::{CartId, OrgId, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use super::{device_id, parse_org};
use crate::cart::{
    Cart, CartError, CartStore, DurableStore, LocalCart, SharedCartBackend, SharedCartHandle,
};
use crate::error::{AppError, Result};
use crate::models::cart::{CartLine, LineKey, ProductSnapshot};
use crate::state::AppState;

/// One cart line as rendered in API responses.
#[derive(Debug, Serialize)]
pub struct LineView {
    pub key: LineKey,
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity: u32,
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contributor: Option<String>,
    pub subtotal: Decimal,
}

impl From<&CartLine> for LineView {
    fn from(line: &CartLine) -> Self {
        Self {
            key: line.key,
            product_id: line.product.product_id,
            name: line.product.name.clone(),
            unit_price: line.product.unit_price.to_decimal(),
            quantity: line.quantity,
            notes: line.notes.clone(),
            contributor: line.contributor.clone(),
            subtotal: line.subtotal().to_decimal(),
        }
    }
}

/// A cart as rendered in API responses.
#[derive(Debug, Serialize)]
pub struct CartView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cart_id: Option<CartId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_code: Option<String>,
    pub items: Vec<LineView>,
    pub subtotal: Decimal,
}

impl CartView {
    fn local(cart: &impl CartStore) -> Self {
        Self {
            cart_id: None,
            share_code: None,
            items: cart.lines().iter().map(LineView::from).collect(),
            subtotal: cart.subtotal().to_decimal(),
        }
    }

    fn shared(cart_id: CartId, share_code: Option<String>, lines: &[CartLine]) -> Self {
        let subtotal: quiosque_core::Price = lines.iter().map(CartLine::subtotal).sum();
        Self {
            cart_id: Some(cart_id),
            share_code,
            items: lines.iter().map(LineView::from).collect(),
            subtotal: subtotal.to_decimal(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub notes: String,
    /// Display name of the participant adding the line (shared carts).
    #[serde(default)]
    pub participant: Option<String>,
}

const fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    /// Signed adjustment; the resulting quantity is clamped to at least 1.
    pub delta: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateSharedCartRequest {
    pub created_by: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinSharedCartRequest {
    pub participant: String,
}

fn cart_error(err: CartError) -> AppError {
    match err {
        CartError::LineNotFound(key) => AppError::NotFound(format!("cart line {key}")),
        CartError::Remote(e) => AppError::Database(e),
    }
}

fn participant_name(name: Option<String>) -> Result<String> {
    let name = name.unwrap_or_default();
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest(
            "participant name is required".to_owned(),
        ));
    }
    Ok(name.to_owned())
}

/// Re-read the product and build the priced snapshot for a new cart line.
pub(crate) async fn priced_snapshot(
    state: &AppState,
    org: &OrgId,
    product_id: ProductId,
) -> Result<ProductSnapshot> {
    let product = state
        .catalog()
        .get_product(org, product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {product_id}")))?;
    Ok(ProductSnapshot {
        product_id: product.id,
        name: product.name.clone(),
        unit_price: product.effective_price(),
    })
}

/// Scope a looked-up shared cart to the org in the request path.
///
/// A cart that exists under a different org is reported exactly like one
/// that does not exist, so cart ids cannot be probed across storefronts.
fn cart_in_org(
    handle: Option<SharedCartHandle>,
    org: &OrgId,
    cart_id: CartId,
) -> Result<SharedCartHandle> {
    handle
        .filter(|h| h.org_id == *org)
        .ok_or_else(|| AppError::NotFound(format!("shared cart {cart_id}")))
}

async fn find_cart_in_org(
    state: &AppState,
    org: &OrgId,
    cart_id: CartId,
) -> Result<SharedCartHandle> {
    let handle = state.shared_carts().find_cart(cart_id).await?;
    cart_in_org(handle, org, cart_id)
}

async fn load_local(
    state: &AppState,
    headers: &HeaderMap,
    org: &OrgId,
) -> Result<LocalCart<crate::cart::PgDurableStore>> {
    let device = device_id(headers)?;
    Ok(LocalCart::load(state.local_carts().clone(), device, org.clone()).await)
}

/// `GET /api/{org}/cart`
pub async fn get_local(
    State(state): State<AppState>,
    Path(org): Path<String>,
    headers: HeaderMap,
) -> Result<Json<CartView>> {
    let org = parse_org(&org)?;
    let cart = load_local(&state, &headers, &org).await?;
    Ok(Json(CartView::local(&cart)))
}

/// `POST /api/{org}/cart/items`
pub async fn add_local(
    State(state): State<AppState>,
    Path(org): Path<String>,
    headers: HeaderMap,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<CartView>> {
    let org = parse_org(&org)?;
    let snapshot = priced_snapshot(&state, &org, request.product_id).await?;
    let mut cart = load_local(&state, &headers, &org).await?;
    cart.add_item(snapshot, request.quantity, &request.notes)
        .await
        .map_err(cart_error)?;
    Ok(Json(CartView::local(&cart)))
}

/// `PATCH /api/{org}/cart/items/{key}`
pub async fn update_local(
    State(state): State<AppState>,
    Path((org, key)): Path<(String, LineKey)>,
    headers: HeaderMap,
    Json(request): Json<UpdateQuantityRequest>,
) -> Result<Json<CartView>> {
    let org = parse_org(&org)?;
    let mut cart = load_local(&state, &headers, &org).await?;
    cart.update_quantity(key, request.delta)
        .await
        .map_err(cart_error)?;
    Ok(Json(CartView::local(&cart)))
}

/// `DELETE /api/{org}/cart/items/{key}`
pub async fn remove_local(
    State(state): State<AppState>,
    Path((org, key)): Path<(String, LineKey)>,
    headers: HeaderMap,
) -> Result<Json<CartView>> {
    let org = parse_org(&org)?;
    let mut cart = load_local(&state, &headers, &org).await?;
    cart.remove_item(key).await.map_err(cart_error)?;
    Ok(Json(CartView::local(&cart)))
}

/// `DELETE /api/{org}/cart`
pub async fn clear_local(
    State(state): State<AppState>,
    Path(org): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let org = parse_org(&org)?;
    let mut cart = load_local(&state, &headers, &org).await?;
    cart.clear().await.map_err(cart_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/{org}/cart/join/{cart_id}`
///
/// Switches the device's session onto an existing shared cart. The local
/// cart's lines are discarded, not merged; the switch is one-way for the
/// session. Unknown cart ids leave the local cart untouched.
pub async fn join_shared(
    State(state): State<AppState>,
    Path((org, cart_id)): Path<(String, CartId)>,
    headers: HeaderMap,
    Json(request): Json<JoinSharedCartRequest>,
) -> Result<Json<CartView>> {
    let org = parse_org(&org)?;
    let participant = participant_name(Some(request.participant))?;
    let device = device_id(&headers)?;
    find_cart_in_org(&state, &org, cart_id).await?;

    let local = LocalCart::load(state.local_carts().clone(), device.clone(), org.clone()).await;
    let joined = Cart::Local(local)
        .join_shared(state.shared_carts().clone(), cart_id, &participant)
        .await
        .map_err(cart_error)?
        .ok_or_else(|| AppError::NotFound(format!("shared cart {cart_id}")))?;

    // The local lines are gone for good; drop the durable copy too.
    state.local_carts().remove(&device, &org).await?;

    Ok(Json(CartView::shared(cart_id, None, joined.lines())))
}

/// `POST /api/{org}/shared-carts`
///
/// Creates a shared cart and switches the device's session onto it; like
/// joining, any local lines are discarded rather than migrated.
pub async fn create_shared(
    State(state): State<AppState>,
    Path(org): Path<String>,
    headers: HeaderMap,
    Json(request): Json<CreateSharedCartRequest>,
) -> Result<(StatusCode, Json<CartView>)> {
    let org = parse_org(&org)?;
    let created_by = participant_name(Some(request.created_by))?;
    let device = device_id(&headers)?;

    let local = LocalCart::load(state.local_carts().clone(), device.clone(), org.clone()).await;
    let cart = Cart::Local(local)
        .create_shared(state.shared_carts().clone(), &org, &created_by)
        .await
        .map_err(cart_error)?;
    state.local_carts().remove(&device, &org).await?;

    let Some(handle) = cart.shared_handle() else {
        return Err(AppError::Internal(
            "shared cart creation produced no handle".to_owned(),
        ));
    };
    let view = CartView::shared(handle.cart_id, Some(handle.share_code.clone()), cart.lines());
    Ok((StatusCode::CREATED, Json(view)))
}

async fn shared_view(state: &AppState, org: &OrgId, cart_id: CartId) -> Result<CartView> {
    let handle = find_cart_in_org(state, org, cart_id).await?;
    let lines = state.shared_carts().fetch_lines(cart_id).await?;
    Ok(CartView::shared(
        cart_id,
        Some(handle.share_code),
        &lines,
    ))
}

/// `GET /api/{org}/shared-carts/{cart_id}`
pub async fn get_shared(
    State(state): State<AppState>,
    Path((org, cart_id)): Path<(String, CartId)>,
) -> Result<Json<CartView>> {
    let org = parse_org(&org)?;
    Ok(Json(shared_view(&state, &org, cart_id).await?))
}

/// `POST /api/{org}/shared-carts/{cart_id}/items`
pub async fn add_shared(
    State(state): State<AppState>,
    Path((org, cart_id)): Path<(String, CartId)>,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<CartView>> {
    let org = parse_org(&org)?;
    let participant = participant_name(request.participant.clone())?;
    find_cart_in_org(&state, &org, cart_id).await?;

    let snapshot = priced_snapshot(&state, &org, request.product_id).await?;
    state
        .shared_carts()
        .upsert_line(
            cart_id,
            snapshot,
            request.quantity,
            &request.notes,
            &participant,
        )
        .await?;
    Ok(Json(shared_view(&state, &org, cart_id).await?))
}

/// `PATCH /api/{org}/shared-carts/{cart_id}/items/{key}`
pub async fn update_shared(
    State(state): State<AppState>,
    Path((org, cart_id, key)): Path<(String, CartId, LineKey)>,
    Json(request): Json<UpdateQuantityRequest>,
) -> Result<Json<CartView>> {
    let org = parse_org(&org)?;
    find_cart_in_org(&state, &org, cart_id).await?;
    state
        .shared_carts()
        .bump_quantity(cart_id, key, request.delta)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("cart line {key}")))?;
    Ok(Json(shared_view(&state, &org, cart_id).await?))
}

/// `DELETE /api/{org}/shared-carts/{cart_id}/items/{key}`
pub async fn remove_shared(
    State(state): State<AppState>,
    Path((org, cart_id, key)): Path<(String, CartId, LineKey)>,
) -> Result<StatusCode> {
    let org = parse_org(&org)?;
    find_cart_in_org(&state, &org, cart_id).await?;
    state.shared_carts().remove_line(cart_id, key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/{org}/shared-carts/{cart_id}/events`
///
/// Server-sent events carrying every line change on the cart. A client
/// that receives the `resync` event (emitted after buffer overflow) should
/// re-fetch the cart to catch up.
pub async fn shared_events(
    State(state): State<AppState>,
    Path((org, cart_id)): Path<(String, CartId)>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let org = parse_org(&org)?;
    find_cart_in_org(&state, &org, cart_id).await?;

    let feed = state.realtime().subscribe_cart(cart_id);
    let stream = BroadcastStream::new(feed).filter_map(|event| async move {
        match event {
            Ok(event) => Event::default()
                .event("cart")
                .json_data(&event)
                .ok()
                .map(Ok::<_, Infallible>),
            Err(BroadcastStreamRecvError::Lagged(_)) => {
                Some(Ok(Event::default().event("resync").data("")))
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle_for(org: &OrgId, cart_id: CartId) -> SharedCartHandle {
        SharedCartHandle {
            cart_id,
            org_id: org.clone(),
            share_code: "BURGER".to_owned(),
        }
    }

    #[test]
    fn test_cart_in_matching_org_is_found() {
        let org = OrgId::parse("burgeria").expect("valid org");
        let cart_id = CartId::generate();
        let handle = cart_in_org(Some(handle_for(&org, cart_id)), &org, cart_id)
            .expect("cart in its own org resolves");
        assert_eq!(handle.cart_id, cart_id);
    }

    #[test]
    fn test_cart_under_another_org_reads_as_absent() {
        let owner = OrgId::parse("burgeria").expect("valid org");
        let other = OrgId::parse("pizzaria").expect("valid org");
        let cart_id = CartId::generate();
        let err = cart_in_org(Some(handle_for(&owner, cart_id)), &other, cart_id)
            .expect_err("cross-org lookup must not resolve");
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_unknown_cart_is_absent() {
        let org = OrgId::parse("burgeria").expect("valid org");
        let cart_id = CartId::generate();
        let err = cart_in_org(None, &org, cart_id).expect_err("unknown cart must not resolve");
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
