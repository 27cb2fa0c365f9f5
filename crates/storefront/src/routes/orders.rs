//! Checkout and order observation handlers.

use std::convert::Infallible;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use quiosque_core::{OrderId, PaymentMethod, Phone, Price, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use axum::http::HeaderMap;

use super::{device_id, parse_org};
use crate::cart::DurableStore;
use crate::error::{AppError, Result};
use crate::middleware::CustomerIdentity;
use crate::models::cart::CartLine;
use crate::models::order::{Fulfillment, Order};
use crate::orders::{CallerIdentity, CheckoutError, CheckoutRequest, CustomerDetails};
use crate::routes::carts::priced_snapshot;
use crate::state::AppState;

/// One submitted order line: the product reference plus customization.
/// Prices come from the catalog at submission time, never from the client.
#[derive(Debug, Deserialize)]
pub struct SubmittedLine {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub customer_name: String,
    pub customer_phone: String,
    pub payment_method: PaymentMethod,
    pub fulfillment: Fulfillment,
    pub items: Vec<SubmittedLine>,
    /// Loyalty amount to redeem, as a decimal (e.g. `"5.00"`).
    #[serde(default)]
    pub loyalty_redeem: Option<Decimal>,
    pub idempotency_key: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: OrderId,
    pub total: Decimal,
    pub replayed: bool,
}

/// `POST /api/{org}/orders`
pub async fn create(
    State(state): State<AppState>,
    Path(org): Path<String>,
    CustomerIdentity(customer_id): CustomerIdentity,
    headers: HeaderMap,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>)> {
    let org = parse_org(&org)?;

    let phone = Phone::parse(&request.customer_phone)
        .map_err(|e| AppError::BadRequest(format!("invalid phone number: {e}")))?;

    let loyalty_redeem = match request.loyalty_redeem {
        Some(amount) => Price::from_decimal(amount).ok_or_else(|| {
            CheckoutError::InvalidAmount(format!("unrepresentable redemption amount {amount}"))
        })?,
        None => Price::ZERO,
    };

    let mut lines: Vec<CartLine> = Vec::with_capacity(request.items.len());
    for item in &request.items {
        let snapshot = priced_snapshot(&state, &org, item.product_id).await?;
        lines.push(CartLine::new(snapshot, item.quantity, &item.notes));
    }

    let receipt = state
        .assembler()
        .place_order(
            &org,
            CheckoutRequest {
                customer: CustomerDetails {
                    customer_id,
                    name: request.customer_name,
                    phone,
                },
                payment_method: request.payment_method,
                fulfillment: request.fulfillment,
                lines,
                loyalty_redeem,
                idempotency_key: request.idempotency_key,
            },
        )
        .await?;

    // A placed order empties the device's cart. Failures here are logged
    // only; the order is already committed.
    if !receipt.replayed
        && let Ok(device) = device_id(&headers)
        && let Err(e) = state.local_carts().remove(&device, &org).await
    {
        tracing::warn!(
            order_id = %receipt.order_id,
            error = %e,
            "failed to clear cart after checkout"
        );
    }

    let status = if receipt.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(CreateOrderResponse {
            order_id: receipt.order_id,
            total: receipt.total.to_decimal(),
            replayed: receipt.replayed,
        }),
    ))
}

/// Query parameters for guest order lookups.
#[derive(Debug, Deserialize)]
pub struct DetailQuery {
    /// Phone number the order was placed under; lets guests read their own
    /// order without a session.
    pub phone: Option<String>,
}

fn caller(customer_id: Option<quiosque_core::CustomerId>, query: DetailQuery) -> Result<CallerIdentity> {
    let phone = match query.phone {
        Some(raw) => Some(
            Phone::parse(&raw)
                .map_err(|e| AppError::BadRequest(format!("invalid phone number: {e}")))?,
        ),
        None => None,
    };
    Ok(CallerIdentity { customer_id, phone })
}

/// `GET /api/{org}/orders/{id}`
pub async fn detail(
    State(state): State<AppState>,
    Path((org, order_id)): Path<(String, OrderId)>,
    CustomerIdentity(customer_id): CustomerIdentity,
    Query(query): Query<DetailQuery>,
) -> Result<Json<Order>> {
    parse_org(&org)?;
    let caller = caller(customer_id, query)?;
    let order = state
        .orders()
        .get_detail(order_id, &caller)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {order_id}")))?;
    Ok(Json(order))
}

/// `GET /api/{org}/orders/{id}/events`
///
/// Server-sent status events: the current status immediately, then each
/// change, closing after a terminal status. Authorized exactly like the
/// detail read.
pub async fn events(
    State(state): State<AppState>,
    Path((org, order_id)): Path<(String, OrderId)>,
    CustomerIdentity(customer_id): CustomerIdentity,
    Query(query): Query<DetailQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    parse_org(&org)?;
    let caller = caller(customer_id, query)?;
    state
        .orders()
        .get_detail(order_id, &caller)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {order_id}")))?;

    let stream = state
        .observer()
        .watch(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {order_id}")))?;

    let stream = stream.filter_map(|event| async move {
        Event::default()
            .event("status")
            .json_data(&event)
            .ok()
            .map(Ok::<_, Infallible>)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
