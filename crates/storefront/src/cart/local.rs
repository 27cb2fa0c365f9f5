//! Local cart backend: in-memory lines written through to durable storage.
//!
//! The durable entry is one serialized payload per `(device, org)` pair,
//! read once at session start and rewritten on every mutation. Storage
//! failures never surface to the caller: a cart that cannot be read loads
//! as empty, and a write that fails is logged and dropped (the next
//! mutation retries the full payload anyway).

use chrono::Utc;
use quiosque_core::OrgId;
use sqlx::PgPool;

use super::{CartError, CartStore, clamp_quantity, merge_into, remove_line};
use crate::db::RepositoryError;
use crate::models::cart::{CartLine, LineKey, PersistedCart, ProductSnapshot};

/// Durable key-value storage for serialized local carts.
#[allow(async_fn_in_trait)]
pub trait DurableStore: Send + Sync {
    /// Read the payload stored for `(device, org)`, if any.
    async fn get(&self, device_id: &str, org: &OrgId) -> Result<Option<String>, RepositoryError>;

    /// Write (or overwrite) the payload for `(device, org)`.
    async fn put(&self, device_id: &str, org: &OrgId, payload: &str)
    -> Result<(), RepositoryError>;

    /// Delete the payload for `(device, org)`.
    async fn remove(&self, device_id: &str, org: &OrgId) -> Result<(), RepositoryError>;
}

/// Postgres-backed durable store (`local_cart` table).
#[derive(Clone)]
pub struct PgDurableStore {
    pool: PgPool,
}

impl PgDurableStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DurableStore for PgDurableStore {
    async fn get(&self, device_id: &str, org: &OrgId) -> Result<Option<String>, RepositoryError> {
        let payload = sqlx::query_scalar::<_, String>(
            "SELECT payload FROM local_cart WHERE device_id = $1 AND org_id = $2",
        )
        .bind(device_id)
        .bind(org)
        .fetch_optional(&self.pool)
        .await?;
        Ok(payload)
    }

    async fn put(
        &self,
        device_id: &str,
        org: &OrgId,
        payload: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO local_cart (device_id, org_id, payload, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (device_id, org_id)
            DO UPDATE SET payload = EXCLUDED.payload, updated_at = now()
            ",
        )
        .bind(device_id)
        .bind(org)
        .bind(payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, device_id: &str, org: &OrgId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM local_cart WHERE device_id = $1 AND org_id = $2")
            .bind(device_id)
            .bind(org)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// A device-private cart, persisted under a per-organization durable key.
pub struct LocalCart<S> {
    org: OrgId,
    device_id: String,
    lines: Vec<CartLine>,
    store: S,
}

impl<S: DurableStore> LocalCart<S> {
    /// Load the cart persisted for `(device, org)`, or start empty.
    ///
    /// Corrupt or unreadable stored state degrades to an empty cart with a
    /// logged warning; it never errors.
    pub async fn load(store: S, device_id: impl Into<String>, org: OrgId) -> Self {
        let device_id = device_id.into();
        let lines = match store.get(&device_id, &org).await {
            Ok(Some(payload)) => match serde_json::from_str::<PersistedCart>(&payload) {
                Ok(cart) => cart.items,
                Err(e) => {
                    tracing::warn!(org = %org, error = %e, "discarding corrupt persisted cart");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(org = %org, error = %e, "failed to read persisted cart, starting empty");
                Vec::new()
            }
        };
        Self {
            org,
            device_id,
            lines,
            store,
        }
    }

    /// The organization this cart belongs to.
    #[must_use]
    pub const fn org(&self) -> &OrgId {
        &self.org
    }

    async fn persist(&self) {
        let payload = PersistedCart {
            items: self.lines.clone(),
            updated_at: Utc::now(),
        };
        match serde_json::to_string(&payload) {
            Ok(json) => {
                if let Err(e) = self.store.put(&self.device_id, &self.org, &json).await {
                    tracing::warn!(org = %self.org, error = %e, "failed to persist local cart");
                }
            }
            Err(e) => {
                tracing::warn!(org = %self.org, error = %e, "failed to serialize local cart");
            }
        }
    }
}

impl<S: DurableStore> CartStore for LocalCart<S> {
    fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    async fn add_item(
        &mut self,
        product: ProductSnapshot,
        quantity: u32,
        notes: &str,
    ) -> Result<(), CartError> {
        merge_into(&mut self.lines, product, quantity, notes, None);
        self.persist().await;
        Ok(())
    }

    async fn remove_item(&mut self, key: LineKey) -> Result<(), CartError> {
        if remove_line(&mut self.lines, key) {
            self.persist().await;
        }
        Ok(())
    }

    async fn update_quantity(&mut self, key: LineKey, delta: i64) -> Result<(), CartError> {
        clamp_quantity(&mut self.lines, key, delta).ok_or(CartError::LineNotFound(key))?;
        self.persist().await;
        Ok(())
    }

    async fn clear(&mut self) -> Result<(), CartError> {
        self.lines.clear();
        if let Err(e) = self.store.remove(&self.device_id, &self.org).await {
            tracing::warn!(org = %self.org, error = %e, "failed to clear persisted cart");
        }
        Ok(())
    }
}
