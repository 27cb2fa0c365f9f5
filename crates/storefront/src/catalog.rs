//! Catalog reads with short-TTL caching.
//!
//! The menu changes rarely relative to how often it is read, so listings
//! are cached per `(org, filters)` for a configurable TTL. Staleness up to
//! the TTL is acceptable for browsing; add-to-cart re-reads the product row
//! directly so the priced snapshot is never stale.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use quiosque_core::{CategoryId, OrgId, Price, ProductId};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::db::RepositoryError;
use crate::models::catalog::{CatalogFilters, CatalogView, Category, Product};

const CACHE_MAX_ENTRIES: u64 = 1_000;

/// Cached read access to an organization's menu.
#[derive(Clone)]
pub struct CatalogReader {
    pool: PgPool,
    cache: Cache<(OrgId, CatalogFilters), Arc<CatalogView>>,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    org_id: OrgId,
    category_id: Option<CategoryId>,
    name: String,
    description: String,
    price_cents: Price,
    discount_price_cents: Option<Price>,
    image_url: Option<String>,
    is_promotion: bool,
    is_combo: bool,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            org_id: row.org_id,
            category_id: row.category_id,
            name: row.name,
            description: row.description,
            price: row.price_cents,
            discount_price: row.discount_price_cents,
            image_url: row.image_url,
            is_promotion: row.is_promotion,
            is_combo: row.is_combo,
        }
    }
}

impl CatalogReader {
    #[must_use]
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        Self {
            pool,
            cache: Cache::builder()
                .max_capacity(CACHE_MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// The filtered menu listing for one organization.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] on query failure.
    pub async fn list(
        &self,
        org: &OrgId,
        filters: CatalogFilters,
    ) -> Result<Arc<CatalogView>, RepositoryError> {
        let key = (org.clone(), filters);
        if let Some(view) = self.cache.get(&key).await {
            return Ok(view);
        }

        let view = Arc::new(self.fetch(&key.0, &key.1).await?);
        self.cache.insert(key, Arc::clone(&view)).await;
        Ok(view)
    }

    /// One active product, read fresh (never from cache) so the snapshot
    /// put into a cart always carries the current price.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] on query failure.
    pub async fn get_product(
        &self,
        org: &OrgId,
        product_id: ProductId,
    ) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, org_id, category_id, name, description, price_cents,
                   discount_price_cents, image_url, is_promotion, is_combo
            FROM product
            WHERE id = $1 AND org_id = $2 AND active
            ",
        )
        .bind(product_id)
        .bind(org)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Product::from))
    }

    async fn fetch(
        &self,
        org: &OrgId,
        filters: &CatalogFilters,
    ) -> Result<CatalogView, RepositoryError> {
        let categories = sqlx::query_as::<_, (CategoryId, OrgId, String, i32)>(
            "SELECT id, org_id, name, position FROM category WHERE org_id = $1 ORDER BY position",
        )
        .bind(org)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(id, org_id, name, position)| Category {
            id,
            org_id,
            name,
            position,
        })
        .collect();

        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            r"
            SELECT id, org_id, category_id, name, description, price_cents,
                   discount_price_cents, image_url, is_promotion, is_combo
            FROM product
            WHERE active AND org_id = ",
        );
        builder.push_bind(org);
        if let Some(query) = &filters.query {
            let pattern = format!("%{}%", escape_like(query));
            builder.push(" AND (name ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR description ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }
        if let Some(is_promotion) = filters.is_promotion {
            builder.push(" AND is_promotion = ");
            builder.push_bind(is_promotion);
        }
        if let Some(is_combo) = filters.is_combo {
            builder.push(" AND is_combo = ");
            builder.push_bind(is_combo);
        }
        if let Some(category_id) = filters.category_id {
            builder.push(" AND category_id = ");
            builder.push_bind(category_id);
        }
        builder.push(" ORDER BY name");

        let products = builder
            .build_query_as::<ProductRow>()
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Product::from)
            .collect();

        Ok(CatalogView {
            categories,
            products,
        })
    }
}

/// Escape LIKE metacharacters so a search term matches literally.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_metacharacters() {
        assert_eq!(escape_like("50% off"), "50\\% off");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
        assert_eq!(escape_like("dogão"), "dogão");
    }
}
