//! Menu listing handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use quiosque_core::CategoryId;
use serde::Deserialize;

use super::parse_org;
use crate::error::Result;
use crate::models::catalog::{CatalogFilters, CatalogView};
use crate::state::AppState;

/// Query parameters accepted by the catalog listing.
#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    /// Case-insensitive substring match on name or description.
    pub q: Option<String>,
    pub promotion: Option<bool>,
    pub combo: Option<bool>,
    pub category: Option<CategoryId>,
}

impl From<CatalogQuery> for CatalogFilters {
    fn from(query: CatalogQuery) -> Self {
        Self {
            query: query.q.filter(|q| !q.trim().is_empty()),
            is_promotion: query.promotion,
            is_combo: query.combo,
            category_id: query.category,
        }
    }
}

/// `GET /api/{org}/catalog`
pub async fn list(
    State(state): State<AppState>,
    Path(org): Path<String>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<Arc<CatalogView>>> {
    let org = parse_org(&org)?;
    let view = state.catalog().list(&org, query.into()).await?;
    Ok(Json(view))
}
