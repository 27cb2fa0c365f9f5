//! Domain models for the storefront.

pub mod cart;
pub mod catalog;
pub mod loyalty;
pub mod order;

pub use cart::{CartLine, LineKey, PersistedCart, ProductSnapshot};
pub use catalog::{CatalogFilters, CatalogView, Category, Product};
pub use loyalty::LoyaltyTransaction;
pub use order::{Fulfillment, Order, OrderItem};
