//! Bearer-token authentication extractors.
//!
//! Session tokens are issued by the auth service and validated here against
//! the `customer_session` table. Most storefront endpoints work for guests,
//! so [`CustomerIdentity`] is optional; only loyalty endpoints require a
//! customer via [`RequireCustomer`]. A token that is presented but
//! malformed, unknown, or expired is rejected rather than downgraded to a
//! guest, so clients notice dead sessions instead of silently losing their
//! identity.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use quiosque_core::CustomerId;
use uuid::Uuid;

use crate::db::RepositoryError;
use crate::error::AppError;
use crate::state::AppState;

/// The caller's customer identity, if a valid session token was presented.
#[derive(Debug, Clone, Copy)]
pub struct CustomerIdentity(pub Option<CustomerId>);

/// Extractor that rejects guests with 401.
#[derive(Debug, Clone, Copy)]
pub struct RequireCustomer(pub CustomerId);

async fn resolve_token(state: &AppState, token: &str) -> Result<CustomerId, AppError> {
    let token = token
        .parse::<Uuid>()
        .map_err(|_| AppError::Unauthorized("malformed session token".to_owned()))?;

    let customer_id = sqlx::query_scalar::<_, CustomerId>(
        "SELECT customer_id FROM customer_session WHERE token = $1 AND expires_at > now()",
    )
    .bind(token)
    .fetch_optional(state.pool())
    .await
    .map_err(RepositoryError::from)?;

    customer_id.ok_or_else(|| AppError::Unauthorized("unknown or expired session".to_owned()))
}

fn bearer_token(parts: &Parts) -> Result<Option<&str>, AppError> {
    let Some(value) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::Unauthorized("malformed authorization header".to_owned()))?;
    value
        .strip_prefix("Bearer ")
        .map(Some)
        .ok_or_else(|| AppError::Unauthorized("expected bearer authorization".to_owned()))
}

impl FromRequestParts<AppState> for CustomerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match bearer_token(parts)? {
            Some(token) => Ok(Self(Some(resolve_token(state, token).await?))),
            None => Ok(Self(None)),
        }
    }
}

impl FromRequestParts<AppState> for RequireCustomer {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CustomerIdentity(customer_id) =
            CustomerIdentity::from_request_parts(parts, state).await?;
        customer_id
            .map(Self)
            .ok_or_else(|| AppError::Unauthorized("authentication required".to_owned()))
    }
}
