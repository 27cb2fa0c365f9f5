//! Loyalty balance handlers.

use axum::Json;
use axum::extract::{Path, State};
use rust_decimal::Decimal;
use serde::Serialize;

use super::parse_org;
use crate::error::Result;
use crate::middleware::RequireCustomer;
use crate::models::loyalty::LoyaltyTransaction;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: Decimal,
}

/// `GET /api/{org}/loyalty/balance`
pub async fn balance(
    State(state): State<AppState>,
    Path(org): Path<String>,
    RequireCustomer(customer_id): RequireCustomer,
) -> Result<Json<BalanceResponse>> {
    let org = parse_org(&org)?;
    let balance = state.loyalty().balance(&org, customer_id).await?;
    Ok(Json(BalanceResponse {
        balance: balance.to_decimal(),
    }))
}

/// `GET /api/{org}/loyalty/history`
pub async fn history(
    State(state): State<AppState>,
    Path(org): Path<String>,
    RequireCustomer(customer_id): RequireCustomer,
) -> Result<Json<Vec<LoyaltyTransaction>>> {
    let org = parse_org(&org)?;
    let transactions = state.loyalty().history(&org, customer_id).await?;
    Ok(Json(transactions))
}
