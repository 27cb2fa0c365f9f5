//! The cart store: one interface, two backends.
//!
//! A session's cart is either *local* (private to one device, written
//! through to durable storage) or *shared* (multiple participants mutating
//! one server-held line set, mirrored through the realtime feed). The mode
//! is selected once per session; joining a shared cart discards the local
//! one and there is no way back within the session.

pub mod local;
pub mod shared;

pub use local::{DurableStore, LocalCart, PgDurableStore};
pub use shared::{SharedCartBackend, SharedCartHandle, SharedCartRepository, SharedCartSession};

use quiosque_core::Price;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::models::cart::{CartLine, LineKey, ProductSnapshot};

/// Errors from cart operations.
///
/// Local-mode durable-storage failures are deliberately absent: they are
/// swallowed with a logged warning so a broken disk never takes down the
/// cart. Remote failures in shared mode are surfaced; the mirror
/// self-corrects from the realtime feed once connectivity resumes.
#[derive(Debug, Error)]
pub enum CartError {
    #[error("no cart line with key {0}")]
    LineNotFound(LineKey),

    #[error("remote cart operation failed: {0}")]
    Remote(#[from] RepositoryError),
}

/// The cart interface shared by both backends.
#[allow(async_fn_in_trait)]
pub trait CartStore {
    /// Current lines, in insertion order.
    fn lines(&self) -> &[CartLine];

    /// Cart subtotal, always recomputed from the lines.
    fn subtotal(&self) -> Price {
        self.lines().iter().map(CartLine::subtotal).sum()
    }

    /// Add `quantity` of a product. A line with the same derived key has its
    /// quantity increased; otherwise a new line is appended.
    async fn add_item(
        &mut self,
        product: ProductSnapshot,
        quantity: u32,
        notes: &str,
    ) -> Result<(), CartError>;

    /// Delete a line. Removing an absent key is a no-op.
    async fn remove_item(&mut self, key: LineKey) -> Result<(), CartError>;

    /// Adjust a line's quantity by `delta`, clamped to a minimum of 1.
    /// Never removes the line; removal is explicit via [`Self::remove_item`].
    async fn update_quantity(&mut self, key: LineKey, delta: i64) -> Result<(), CartError>;

    /// Empty the cart. Local mode also clears the durable entry; a shared
    /// cart's server rows are left untouched (shared carts are abandoned,
    /// not cleared by one participant).
    async fn clear(&mut self) -> Result<(), CartError>;
}

/// Merge an item into a line set: same derived key increments quantity,
/// otherwise a new line is appended. Returns the resulting line.
pub(crate) fn merge_into(
    lines: &mut Vec<CartLine>,
    product: ProductSnapshot,
    quantity: u32,
    notes: &str,
    contributor: Option<&str>,
) -> CartLine {
    let key = LineKey::derive(product.product_id, notes);
    if let Some(line) = lines.iter_mut().find(|l| l.key == key) {
        line.quantity = line.quantity.saturating_add(quantity.max(1));
        line.clone()
    } else {
        let mut line = CartLine::new(product, quantity, notes);
        line.contributor = contributor.map(str::to_owned);
        lines.push(line.clone());
        line
    }
}

/// Apply a quantity delta with the floor-at-1 rule. Returns the updated
/// line, or `None` if no line has the key.
pub(crate) fn clamp_quantity(lines: &mut [CartLine], key: LineKey, delta: i64) -> Option<CartLine> {
    let line = lines.iter_mut().find(|l| l.key == key)?;
    let next = (i64::from(line.quantity) + delta).max(1);
    line.quantity = u32::try_from(next).unwrap_or(u32::MAX);
    Some(line.clone())
}

/// Remove a line by key. Returns whether a line was removed.
pub(crate) fn remove_line(lines: &mut Vec<CartLine>, key: LineKey) -> bool {
    let before = lines.len();
    lines.retain(|l| l.key != key);
    lines.len() != before
}

/// A session cart in one of its two modes.
///
/// The mode switch is one-way: [`Cart::join_shared`] and
/// [`Cart::create_shared`] consume the local cart and discard its lines
/// (they are not migrated into the shared cart).
pub enum Cart<S: DurableStore, B: SharedCartBackend> {
    Local(LocalCart<S>),
    Shared(SharedCartSession<B>),
}

impl<S: DurableStore, B: SharedCartBackend> Cart<S, B> {
    /// Allocate a new server-side shared cart and switch this session into
    /// shared mode, discarding any local lines.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Remote`] if the cart cannot be created.
    pub async fn create_shared(
        self,
        backend: B,
        org: &quiosque_core::OrgId,
        participant: &str,
    ) -> Result<Self, CartError> {
        let session = SharedCartSession::create(backend, org, participant).await?;
        Ok(Self::Shared(session))
    }

    /// Join an existing shared cart, discarding any local lines. Returns
    /// `Ok(None)` if no cart with that id exists (the session keeps nothing;
    /// callers should fall back to a fresh cart).
    ///
    /// # Errors
    ///
    /// Returns [`CartError::Remote`] if the lookup fails.
    pub async fn join_shared(
        self,
        backend: B,
        cart_id: quiosque_core::CartId,
        participant: &str,
    ) -> Result<Option<Self>, CartError> {
        Ok(SharedCartSession::join(backend, cart_id, participant)
            .await?
            .map(Self::Shared))
    }

    /// The shared cart's identity, when in shared mode.
    #[must_use]
    pub const fn shared_handle(&self) -> Option<&SharedCartHandle> {
        match self {
            Self::Shared(session) => Some(session.handle()),
            Self::Local(_) => None,
        }
    }
}

impl<S: DurableStore, B: SharedCartBackend> CartStore for Cart<S, B> {
    fn lines(&self) -> &[CartLine] {
        match self {
            Self::Local(cart) => cart.lines(),
            Self::Shared(session) => session.lines(),
        }
    }

    async fn add_item(
        &mut self,
        product: ProductSnapshot,
        quantity: u32,
        notes: &str,
    ) -> Result<(), CartError> {
        match self {
            Self::Local(cart) => cart.add_item(product, quantity, notes).await,
            Self::Shared(session) => session.add_item(product, quantity, notes).await,
        }
    }

    async fn remove_item(&mut self, key: LineKey) -> Result<(), CartError> {
        match self {
            Self::Local(cart) => cart.remove_item(key).await,
            Self::Shared(session) => session.remove_item(key).await,
        }
    }

    async fn update_quantity(&mut self, key: LineKey, delta: i64) -> Result<(), CartError> {
        match self {
            Self::Local(cart) => cart.update_quantity(key, delta).await,
            Self::Shared(session) => session.update_quantity(key, delta).await,
        }
    }

    async fn clear(&mut self) -> Result<(), CartError> {
        match self {
            Self::Local(cart) => cart.clear().await,
            Self::Shared(session) => session.clear().await,
        }
    }
}
