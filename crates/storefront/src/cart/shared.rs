//! Shared cart backend: server-held line rows mirrored to participants.
//!
//! Every mutation is a remote row operation; the session's mirror applies
//! only server-confirmed events from the realtime feed. There is no
//! optimistic local mutation, so all participants converge on the same
//! state regardless of delivery order. Quantity merges and clamps happen in
//! SQL (`ON CONFLICT ... DO UPDATE`, `GREATEST`), so two participants
//! adding the same line concurrently both land as increments rather than a
//! last-write-wins clobber.

use std::sync::Arc;

use quiosque_core::{CartId, OrgId, Price, ProductId};
use rand::Rng;
use rand::distr::Alphanumeric;
use sqlx::PgPool;
use tokio::sync::broadcast;

use super::{CartError, CartStore};
use crate::db::RepositoryError;
use crate::models::cart::{CartLine, LineKey, ProductSnapshot};
use crate::realtime::{CartEvent, Realtime};

/// Length of the human-shareable join code.
const SHARE_CODE_LEN: usize = 6;

/// Identity of a shared cart, as returned on create/join.
#[derive(Debug, Clone)]
pub struct SharedCartHandle {
    pub cart_id: CartId,
    pub org_id: OrgId,
    pub share_code: String,
}

/// Server-side operations on shared carts.
///
/// The production implementation is [`SharedCartRepository`]; tests swap in
/// an in-memory one. Both publish row events through the same hub, which is
/// what keeps every participant's mirror honest.
#[allow(async_fn_in_trait)]
pub trait SharedCartBackend: Send + Sync {
    async fn create_cart(
        &self,
        org: &OrgId,
        creator: &str,
    ) -> Result<SharedCartHandle, RepositoryError>;

    async fn find_cart(&self, cart_id: CartId)
    -> Result<Option<SharedCartHandle>, RepositoryError>;

    /// Current line rows, in insertion order.
    async fn fetch_lines(&self, cart_id: CartId) -> Result<Vec<CartLine>, RepositoryError>;

    /// Insert a line or atomically increment the existing one with the same
    /// derived key. Returns the resulting row.
    async fn upsert_line(
        &self,
        cart_id: CartId,
        product: ProductSnapshot,
        quantity: u32,
        notes: &str,
        contributor: &str,
    ) -> Result<CartLine, RepositoryError>;

    /// Atomically apply a quantity delta, clamped to a minimum of 1.
    /// Returns `None` if no row has the key.
    async fn bump_quantity(
        &self,
        cart_id: CartId,
        key: LineKey,
        delta: i64,
    ) -> Result<Option<CartLine>, RepositoryError>;

    /// Delete a line row. Returns whether a row existed.
    async fn remove_line(&self, cart_id: CartId, key: LineKey) -> Result<bool, RepositoryError>;

    /// Subscribe to this cart's row events.
    fn subscribe(&self, cart_id: CartId) -> broadcast::Receiver<CartEvent>;
}

/// Postgres-backed shared cart operations (`shared_cart` / `shared_cart_item`).
#[derive(Clone)]
pub struct SharedCartRepository {
    pool: PgPool,
    realtime: Arc<Realtime>,
}

#[derive(sqlx::FromRow)]
struct SharedLineRow {
    line_key: LineKey,
    product_id: ProductId,
    product_name: String,
    unit_price_cents: Price,
    quantity: i32,
    notes: String,
    contributor: String,
}

impl TryFrom<SharedLineRow> for CartLine {
    type Error = RepositoryError;

    fn try_from(row: SharedLineRow) -> Result<Self, RepositoryError> {
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "shared cart line {} has non-positive quantity {}",
                row.line_key, row.quantity
            ))
        })?;
        Ok(Self {
            key: row.line_key,
            product: ProductSnapshot {
                product_id: row.product_id,
                name: row.product_name,
                unit_price: row.unit_price_cents,
            },
            quantity,
            notes: row.notes,
            contributor: Some(row.contributor),
        })
    }
}

impl SharedCartRepository {
    #[must_use]
    pub const fn new(pool: PgPool, realtime: Arc<Realtime>) -> Self {
        Self { pool, realtime }
    }

    fn generate_share_code() -> String {
        rand::rng()
            .sample_iter(Alphanumeric)
            .take(SHARE_CODE_LEN)
            .map(|b| char::from(b).to_ascii_uppercase())
            .collect()
    }
}

impl SharedCartBackend for SharedCartRepository {
    async fn create_cart(
        &self,
        org: &OrgId,
        creator: &str,
    ) -> Result<SharedCartHandle, RepositoryError> {
        // Share codes are short, so collide eventually; retry a few times
        // before giving up.
        for _ in 0..3 {
            let share_code = Self::generate_share_code();
            let result = sqlx::query_scalar::<_, CartId>(
                r"
                INSERT INTO shared_cart (org_id, share_code, created_by)
                VALUES ($1, $2, $3)
                RETURNING id
                ",
            )
            .bind(org)
            .bind(&share_code)
            .bind(creator)
            .fetch_one(&self.pool)
            .await;

            match result {
                Ok(cart_id) => {
                    return Ok(SharedCartHandle {
                        cart_id,
                        org_id: org.clone(),
                        share_code,
                    });
                }
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Err(RepositoryError::Conflict(
            "could not allocate a unique share code".to_owned(),
        ))
    }

    async fn find_cart(
        &self,
        cart_id: CartId,
    ) -> Result<Option<SharedCartHandle>, RepositoryError> {
        let row = sqlx::query_as::<_, (CartId, OrgId, String)>(
            "SELECT id, org_id, share_code FROM shared_cart WHERE id = $1",
        )
        .bind(cart_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(cart_id, org_id, share_code)| SharedCartHandle {
            cart_id,
            org_id,
            share_code,
        }))
    }

    async fn fetch_lines(&self, cart_id: CartId) -> Result<Vec<CartLine>, RepositoryError> {
        let rows = sqlx::query_as::<_, SharedLineRow>(
            r"
            SELECT line_key, product_id, product_name, unit_price_cents,
                   quantity, notes, contributor
            FROM shared_cart_item
            WHERE cart_id = $1
            ORDER BY added_at
            ",
        )
        .bind(cart_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CartLine::try_from).collect()
    }

    async fn upsert_line(
        &self,
        cart_id: CartId,
        product: ProductSnapshot,
        quantity: u32,
        notes: &str,
        contributor: &str,
    ) -> Result<CartLine, RepositoryError> {
        let key = LineKey::derive(product.product_id, notes);
        let row = sqlx::query_as::<_, SharedLineRow>(
            r"
            INSERT INTO shared_cart_item
                (cart_id, line_key, product_id, product_name, unit_price_cents,
                 quantity, notes, contributor)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (cart_id, line_key)
            DO UPDATE SET quantity = shared_cart_item.quantity + EXCLUDED.quantity
            RETURNING line_key, product_id, product_name, unit_price_cents,
                      quantity, notes, contributor
            ",
        )
        .bind(cart_id)
        .bind(key)
        .bind(product.product_id)
        .bind(&product.name)
        .bind(product.unit_price)
        .bind(i64::from(quantity.max(1)))
        .bind(notes.trim())
        .bind(contributor)
        .fetch_one(&self.pool)
        .await?;

        let line = CartLine::try_from(row)?;
        self.realtime
            .publish_cart(cart_id, CartEvent::LineUpserted { line: line.clone() });
        Ok(line)
    }

    async fn bump_quantity(
        &self,
        cart_id: CartId,
        key: LineKey,
        delta: i64,
    ) -> Result<Option<CartLine>, RepositoryError> {
        let row = sqlx::query_as::<_, SharedLineRow>(
            r"
            UPDATE shared_cart_item
            SET quantity = GREATEST(1, quantity + $3)
            WHERE cart_id = $1 AND line_key = $2
            RETURNING line_key, product_id, product_name, unit_price_cents,
                      quantity, notes, contributor
            ",
        )
        .bind(cart_id)
        .bind(key)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let line = CartLine::try_from(row)?;
                self.realtime
                    .publish_cart(cart_id, CartEvent::LineUpserted { line: line.clone() });
                Ok(Some(line))
            }
            None => Ok(None),
        }
    }

    async fn remove_line(&self, cart_id: CartId, key: LineKey) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM shared_cart_item WHERE cart_id = $1 AND line_key = $2",
        )
        .bind(cart_id)
        .bind(key)
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            self.realtime
                .publish_cart(cart_id, CartEvent::LineRemoved { key });
        }
        Ok(removed)
    }

    fn subscribe(&self, cart_id: CartId) -> broadcast::Receiver<CartEvent> {
        self.realtime.subscribe_cart(cart_id)
    }
}

/// One participant's live view of a shared cart.
///
/// The mirror reflects server-confirmed state only: every mutation is a
/// remote write, and the local line set updates by draining the event feed
/// afterwards. On event-buffer overflow the mirror resynchronizes with a
/// full fetch.
pub struct SharedCartSession<B> {
    handle: SharedCartHandle,
    participant: String,
    lines: Vec<CartLine>,
    events: broadcast::Receiver<CartEvent>,
    backend: B,
}

impl<B: SharedCartBackend> SharedCartSession<B> {
    /// Allocate a new shared cart and open a session on it.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Remote`] if the cart cannot be created.
    pub async fn create(backend: B, org: &OrgId, participant: &str) -> Result<Self, CartError> {
        let handle = backend.create_cart(org, participant).await?;
        let events = backend.subscribe(handle.cart_id);
        Ok(Self {
            handle,
            participant: participant.to_owned(),
            lines: Vec::new(),
            events,
            backend,
        })
    }

    /// Open a session on an existing shared cart, reconstructing the mirror
    /// from the server. Returns `Ok(None)` if the cart does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Remote`] if the lookup or initial fetch fails.
    pub async fn join(
        backend: B,
        cart_id: CartId,
        participant: &str,
    ) -> Result<Option<Self>, CartError> {
        let Some(handle) = backend.find_cart(cart_id).await? else {
            return Ok(None);
        };
        // Subscribe before the initial fetch so no event falls in the gap.
        let events = backend.subscribe(cart_id);
        let lines = backend.fetch_lines(cart_id).await?;
        Ok(Some(Self {
            handle,
            participant: participant.to_owned(),
            lines,
            events,
            backend,
        }))
    }

    /// The shared cart's identity (for producing a shareable reference).
    #[must_use]
    pub const fn handle(&self) -> &SharedCartHandle {
        &self.handle
    }

    /// Drain pending row events into the mirror.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Remote`] if a lag-triggered resync fetch fails.
    pub async fn pump(&mut self) -> Result<(), CartError> {
        loop {
            match self.events.try_recv() {
                Ok(event) => apply_event(&mut self.lines, &event),
                Err(broadcast::error::TryRecvError::Empty
                | broadcast::error::TryRecvError::Closed) => break,
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    tracing::warn!(
                        cart_id = %self.handle.cart_id,
                        missed,
                        "shared cart mirror lagged, resynchronizing"
                    );
                    self.lines = self.backend.fetch_lines(self.handle.cart_id).await?;
                }
            }
        }
        Ok(())
    }
}

/// Apply one server-confirmed row event to a mirror.
fn apply_event(lines: &mut Vec<CartLine>, event: &CartEvent) {
    match event {
        CartEvent::LineUpserted { line } => {
            if let Some(existing) = lines.iter_mut().find(|l| l.key == line.key) {
                *existing = line.clone();
            } else {
                lines.push(line.clone());
            }
        }
        CartEvent::LineRemoved { key } => lines.retain(|l| l.key != *key),
    }
}

impl<B: SharedCartBackend> CartStore for SharedCartSession<B> {
    fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    async fn add_item(
        &mut self,
        product: ProductSnapshot,
        quantity: u32,
        notes: &str,
    ) -> Result<(), CartError> {
        self.backend
            .upsert_line(
                self.handle.cart_id,
                product,
                quantity,
                notes,
                &self.participant,
            )
            .await?;
        self.pump().await
    }

    async fn remove_item(&mut self, key: LineKey) -> Result<(), CartError> {
        self.backend.remove_line(self.handle.cart_id, key).await?;
        self.pump().await
    }

    async fn update_quantity(&mut self, key: LineKey, delta: i64) -> Result<(), CartError> {
        self.backend
            .bump_quantity(self.handle.cart_id, key, delta)
            .await?
            .ok_or(CartError::LineNotFound(key))?;
        self.pump().await
    }

    async fn clear(&mut self) -> Result<(), CartError> {
        // One participant cannot clear a shared cart's server rows; the
        // session just walks away from it.
        self.lines.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Mutex, PoisonError};

    use quiosque_core::ProductId;

    use super::*;
    use crate::cart::merge_into;

    /// In-memory shared-cart backend for tests, publishing through a real hub.
    #[derive(Clone)]
    struct MemoryBackend {
        carts: Arc<Mutex<HashMap<CartId, (OrgId, Vec<CartLine>)>>>,
        realtime: Arc<Realtime>,
    }

    impl MemoryBackend {
        fn new() -> Self {
            Self {
                carts: Arc::new(Mutex::new(HashMap::new())),
                realtime: Arc::new(Realtime::new()),
            }
        }
    }

    impl SharedCartBackend for MemoryBackend {
        async fn create_cart(
            &self,
            org: &OrgId,
            _creator: &str,
        ) -> Result<SharedCartHandle, RepositoryError> {
            let cart_id = CartId::generate();
            self.carts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(cart_id, (org.clone(), Vec::new()));
            Ok(SharedCartHandle {
                cart_id,
                org_id: org.clone(),
                share_code: "TEST01".to_owned(),
            })
        }

        async fn find_cart(
            &self,
            cart_id: CartId,
        ) -> Result<Option<SharedCartHandle>, RepositoryError> {
            Ok(self
                .carts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&cart_id)
                .map(|(org, _)| SharedCartHandle {
                    cart_id,
                    org_id: org.clone(),
                    share_code: "TEST01".to_owned(),
                }))
        }

        async fn fetch_lines(&self, cart_id: CartId) -> Result<Vec<CartLine>, RepositoryError> {
            Ok(self
                .carts
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&cart_id)
                .map(|(_, lines)| lines.clone())
                .unwrap_or_default())
        }

        async fn upsert_line(
            &self,
            cart_id: CartId,
            product: ProductSnapshot,
            quantity: u32,
            notes: &str,
            contributor: &str,
        ) -> Result<CartLine, RepositoryError> {
            let mut carts = self.carts.lock().unwrap_or_else(PoisonError::into_inner);
            let (_, lines) = carts
                .get_mut(&cart_id)
                .ok_or_else(|| RepositoryError::DataCorruption("no such cart".to_owned()))?;
            let mut line = merge_into(lines, product, quantity, notes, Some(contributor));
            line.contributor.get_or_insert_with(|| contributor.to_owned());
            drop(carts);
            self.realtime
                .publish_cart(cart_id, CartEvent::LineUpserted { line: line.clone() });
            Ok(line)
        }

        async fn bump_quantity(
            &self,
            cart_id: CartId,
            key: LineKey,
            delta: i64,
        ) -> Result<Option<CartLine>, RepositoryError> {
            let mut carts = self.carts.lock().unwrap_or_else(PoisonError::into_inner);
            let Some((_, lines)) = carts.get_mut(&cart_id) else {
                return Ok(None);
            };
            let updated = crate::cart::clamp_quantity(lines, key, delta);
            drop(carts);
            if let Some(line) = &updated {
                self.realtime
                    .publish_cart(cart_id, CartEvent::LineUpserted { line: line.clone() });
            }
            Ok(updated)
        }

        async fn remove_line(
            &self,
            cart_id: CartId,
            key: LineKey,
        ) -> Result<bool, RepositoryError> {
            let mut carts = self.carts.lock().unwrap_or_else(PoisonError::into_inner);
            let Some((_, lines)) = carts.get_mut(&cart_id) else {
                return Ok(false);
            };
            let removed = crate::cart::remove_line(lines, key);
            drop(carts);
            if removed {
                self.realtime
                    .publish_cart(cart_id, CartEvent::LineRemoved { key });
            }
            Ok(removed)
        }

        fn subscribe(&self, cart_id: CartId) -> broadcast::Receiver<CartEvent> {
            self.realtime.subscribe_cart(cart_id)
        }
    }

    fn org() -> OrgId {
        OrgId::parse("foodtruck").expect("valid slug")
    }

    fn snapshot(name: &str, cents: i64) -> ProductSnapshot {
        ProductSnapshot {
            product_id: ProductId::generate(),
            name: name.to_owned(),
            unit_price: quiosque_core::Price::from_minor_units(cents),
        }
    }

    #[tokio::test]
    async fn test_participants_converge_on_server_state() {
        let backend = MemoryBackend::new();
        let mut alice = SharedCartSession::create(backend.clone(), &org(), "alice")
            .await
            .expect("create");
        let cart_id = alice.handle().cart_id;
        let mut bob = SharedCartSession::join(backend, cart_id, "bob")
            .await
            .expect("join")
            .expect("cart exists");

        alice
            .add_item(snapshot("Dogão Clássico", 1500), 2, "")
            .await
            .expect("add");

        bob.pump().await.expect("pump");
        assert_eq!(bob.lines(), alice.lines());
        assert_eq!(bob.lines()[0].quantity, 2);
        assert_eq!(bob.lines()[0].contributor.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_same_line_from_two_participants_merges() {
        let backend = MemoryBackend::new();
        let mut alice = SharedCartSession::create(backend.clone(), &org(), "alice")
            .await
            .expect("create");
        let cart_id = alice.handle().cart_id;
        let mut bob = SharedCartSession::join(backend, cart_id, "bob")
            .await
            .expect("join")
            .expect("cart exists");

        let product = snapshot("Coca-Cola", 650);
        alice.add_item(product.clone(), 1, "").await.expect("add");
        bob.pump().await.expect("pump");
        bob.add_item(product, 2, "").await.expect("add");

        alice.pump().await.expect("pump");
        assert_eq!(alice.lines().len(), 1);
        assert_eq!(alice.lines()[0].quantity, 3);
    }

    #[tokio::test]
    async fn test_join_reconstructs_existing_lines() {
        let backend = MemoryBackend::new();
        let mut alice = SharedCartSession::create(backend.clone(), &org(), "alice")
            .await
            .expect("create");
        alice
            .add_item(snapshot("Dogão Clássico", 1500), 1, "sem cebola")
            .await
            .expect("add");

        let bob = SharedCartSession::join(backend, alice.handle().cart_id, "bob")
            .await
            .expect("join")
            .expect("cart exists");
        assert_eq!(bob.lines().len(), 1);
        assert_eq!(bob.lines()[0].notes, "sem cebola");
    }

    #[tokio::test]
    async fn test_join_unknown_cart_is_none() {
        let backend = MemoryBackend::new();
        let session = SharedCartSession::join(backend, CartId::generate(), "bob")
            .await
            .expect("lookup");
        assert!(session.is_none());
    }

    #[tokio::test]
    async fn test_remove_propagates_to_other_mirror() {
        let backend = MemoryBackend::new();
        let mut alice = SharedCartSession::create(backend.clone(), &org(), "alice")
            .await
            .expect("create");
        let cart_id = alice.handle().cart_id;
        let mut bob = SharedCartSession::join(backend, cart_id, "bob")
            .await
            .expect("join")
            .expect("cart exists");

        alice
            .add_item(snapshot("Dogão Clássico", 1500), 1, "")
            .await
            .expect("add");
        let key = alice.lines()[0].key;
        alice.remove_item(key).await.expect("remove");

        bob.pump().await.expect("pump");
        assert!(bob.lines().is_empty());
    }

    #[tokio::test]
    async fn test_clear_leaves_server_rows() {
        let backend = MemoryBackend::new();
        let mut alice = SharedCartSession::create(backend.clone(), &org(), "alice")
            .await
            .expect("create");
        let cart_id = alice.handle().cart_id;
        alice
            .add_item(snapshot("Dogão Clássico", 1500), 1, "")
            .await
            .expect("add");

        alice.clear().await.expect("clear");
        assert!(alice.lines().is_empty());

        // Another participant still sees the line on the server.
        let bob = SharedCartSession::join(backend, cart_id, "bob")
            .await
            .expect("join")
            .expect("cart exists");
        assert_eq!(bob.lines().len(), 1);
    }

    #[tokio::test]
    async fn test_update_quantity_clamps_remotely() {
        let backend = MemoryBackend::new();
        let mut alice = SharedCartSession::create(backend, &org(), "alice")
            .await
            .expect("create");
        alice
            .add_item(snapshot("Dogão Clássico", 1500), 4, "")
            .await
            .expect("add");
        let key = alice.lines()[0].key;

        alice.update_quantity(key, -999).await.expect("update");
        assert_eq!(alice.lines()[0].quantity, 1);
    }
}
