//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::cart::{PgDurableStore, SharedCartRepository};
use crate::catalog::CatalogReader;
use crate::config::StorefrontConfig;
use crate::loyalty::LoyaltyLedger;
use crate::orders::{OrderAssembler, OrderRepository, OrderStatusObserver, PgCheckoutStore};
use crate::realtime::Realtime;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`; every component hangs off the same pool and
/// realtime hub.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    realtime: Arc<Realtime>,
    catalog: CatalogReader,
    local_carts: PgDurableStore,
    shared_carts: SharedCartRepository,
    assembler: OrderAssembler,
    orders: OrderRepository,
    observer: OrderStatusObserver<OrderRepository>,
    loyalty: LoyaltyLedger,
}

impl AppState {
    /// Wire up all components around one pool and one realtime hub.
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Self {
        let realtime = Arc::new(Realtime::new());
        let catalog = CatalogReader::new(pool.clone(), config.catalog_cache_ttl);
        let local_carts = PgDurableStore::new(pool.clone());
        let shared_carts = SharedCartRepository::new(pool.clone(), Arc::clone(&realtime));
        let assembler = OrderAssembler::new(PgCheckoutStore::new(pool.clone()), Arc::clone(&realtime));
        let orders = OrderRepository::new(pool.clone());
        let observer = OrderStatusObserver::new(
            orders.clone(),
            Arc::clone(&realtime),
            config.status_reconcile_interval,
        );
        let loyalty = LoyaltyLedger::new(pool.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                realtime,
                catalog,
                local_carts,
                shared_carts,
                assembler,
                orders,
                observer,
                loyalty,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn realtime(&self) -> &Arc<Realtime> {
        &self.inner.realtime
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogReader {
        &self.inner.catalog
    }

    /// Durable storage for device-local carts.
    #[must_use]
    pub fn local_carts(&self) -> &PgDurableStore {
        &self.inner.local_carts
    }

    #[must_use]
    pub fn shared_carts(&self) -> &SharedCartRepository {
        &self.inner.shared_carts
    }

    #[must_use]
    pub fn assembler(&self) -> &OrderAssembler {
        &self.inner.assembler
    }

    #[must_use]
    pub fn orders(&self) -> &OrderRepository {
        &self.inner.orders
    }

    #[must_use]
    pub fn observer(&self) -> &OrderStatusObserver<OrderRepository> {
        &self.inner.observer
    }

    #[must_use]
    pub fn loyalty(&self) -> &LoyaltyLedger {
        &self.inner.loyalty
    }
}
