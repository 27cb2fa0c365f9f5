//! Cart lines and their derived keys.
//!
//! A cart is an ordered mapping from a [`LineKey`] to one line. The key is
//! derived deterministically from `(product id, customization notes)`, so
//! adding the same product with the same notes merges into one line while
//! differing notes split into distinct lines.

use chrono::{DateTime, Utc};
use quiosque_core::{Price, ProductId};
use serde::{Deserialize, Serialize};

pub use quiosque_core::LineKey;

/// Immutable product data copied into a cart line at add time.
///
/// Snapshotting decouples carts (and later orders) from the live catalog:
/// a price change after the fact does not reprice lines already added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Price,
}

/// One distinct product+customization entry in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub key: LineKey,
    pub product: ProductSnapshot,
    /// Always >= 1; a line that would reach 0 is removed instead.
    pub quantity: u32,
    pub notes: String,
    /// Participant who added the line (shared carts only).
    pub contributor: Option<String>,
}

impl CartLine {
    /// Build a line for a product, deriving its key.
    #[must_use]
    pub fn new(product: ProductSnapshot, quantity: u32, notes: &str) -> Self {
        Self {
            key: LineKey::derive(product.product_id, notes),
            product,
            quantity: quantity.max(1),
            notes: notes.trim().to_owned(),
            contributor: None,
        }
    }

    /// Line subtotal: unit price times quantity.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.product.unit_price.times(self.quantity)
    }
}

/// The serialized form written to durable local-cart storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedCart {
    pub items: Vec<CartLine>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(name: &str, cents: i64) -> ProductSnapshot {
        ProductSnapshot {
            product_id: ProductId::generate(),
            name: name.to_owned(),
            unit_price: Price::from_minor_units(cents),
        }
    }

    #[test]
    fn test_key_is_deterministic() {
        let product_id = ProductId::generate();
        assert_eq!(
            LineKey::derive(product_id, "no onions"),
            LineKey::derive(product_id, "no onions")
        );
    }

    #[test]
    fn test_key_splits_on_notes() {
        let product_id = ProductId::generate();
        assert_ne!(
            LineKey::derive(product_id, "no onions"),
            LineKey::derive(product_id, "extra cheese")
        );
    }

    #[test]
    fn test_key_ignores_surrounding_whitespace() {
        let product_id = ProductId::generate();
        assert_eq!(
            LineKey::derive(product_id, "  no onions "),
            LineKey::derive(product_id, "no onions")
        );
    }

    #[test]
    fn test_key_differs_across_products() {
        assert_ne!(
            LineKey::derive(ProductId::generate(), ""),
            LineKey::derive(ProductId::generate(), "")
        );
    }

    #[test]
    fn test_line_quantity_floor() {
        let line = CartLine::new(snapshot("Dogão Clássico", 1500), 0, "");
        assert_eq!(line.quantity, 1);
    }

    #[test]
    fn test_line_subtotal() {
        let line = CartLine::new(snapshot("Dogão Clássico", 1500), 2, "");
        assert_eq!(line.subtotal().minor_units(), 3000);
    }
}
