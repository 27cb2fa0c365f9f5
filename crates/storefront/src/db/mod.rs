//! Database access for the storefront `PostgreSQL` instance.
//!
//! ## Tables
//!
//! - `organization` - Tenant storefronts (read-only here; seeded by provisioning)
//! - `category` / `product` - Catalog (read-only here; mutated by catalog management)
//! - `local_cart` - Durable per-(device, org) serialized cart payloads
//! - `shared_cart` / `shared_cart_item` - Server-held multi-participant carts
//! - `storefront_order` / `order_item` - Orders and their immutable line snapshots
//! - `loyalty_transaction` / `loyalty_balance` - Append-only ledger + denormalized balance
//! - `customer_session` - Bearer tokens issued by the external auth service
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run with
//! `sqlx migrate run` against the storefront database.

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The underlying query failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row violates an invariant the schema cannot express.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
