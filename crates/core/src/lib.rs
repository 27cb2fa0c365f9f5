//! Quiosque Core - Shared types library.
//!
//! This crate provides common types used across all Quiosque components:
//! - `storefront` - Customer-facing food-delivery service (cart, checkout, orders)
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, phones, and statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
