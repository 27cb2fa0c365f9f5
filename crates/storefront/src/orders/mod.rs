//! Order creation and observation.
//!
//! Checkout is a single database transaction assembled by
//! [`OrderAssembler`]: validate, snapshot the cart lines, debit any loyalty
//! redemption, and write the order with its items. Either everything
//! commits or nothing does. After creation the storefront never mutates an
//! order; [`OrderStatusObserver`] streams status changes written by the
//! fulfillment side.

pub mod assembler;
pub mod observer;
pub mod repository;

pub use assembler::{CheckoutReceipt, CheckoutStore, OrderAssembler, OrderInsert, PgCheckoutStore};
pub use observer::{OrderStatusObserver, StatusSource};
pub use repository::OrderRepository;

use quiosque_core::{CustomerId, PaymentMethod, Phone, Price};
use thiserror::Error;
use uuid::Uuid;

use crate::db::RepositoryError;
use crate::models::cart::CartLine;
use crate::models::order::Fulfillment;

/// Why a checkout was refused.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("cannot place an order with an empty cart")]
    EmptyCart,

    #[error("missing customer information: {0}")]
    MissingCustomerInfo(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("insufficient loyalty balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Price, available: Price },

    #[error("loyalty redemption requires an authenticated customer")]
    RedemptionRequiresAuth,

    #[error("unknown organization: {0}")]
    OrgNotFound(String),

    #[error(transparent)]
    Database(#[from] RepositoryError),
}

/// Who is placing the order.
#[derive(Debug, Clone)]
pub struct CustomerDetails {
    /// Set when the caller presented a valid session token. Required for
    /// loyalty redemption; guest orders leave it unset.
    pub customer_id: Option<CustomerId>,
    pub name: String,
    pub phone: Phone,
}

/// Everything the assembler needs to turn a cart into an order.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub customer: CustomerDetails,
    pub payment_method: PaymentMethod,
    pub fulfillment: Fulfillment,
    /// The cart lines as the client last saw them; prices are re-read from
    /// the snapshots, the client-computed total is never trusted.
    pub lines: Vec<CartLine>,
    /// Loyalty amount to apply against the total. Zero for no redemption.
    pub loyalty_redeem: Price,
    /// Client-generated key making retries of the same submission safe.
    pub idempotency_key: Uuid,
}

/// Identity facts used to authorize order reads: a session-authenticated
/// customer id, or the phone number supplied with a guest lookup.
#[derive(Debug, Clone, Default)]
pub struct CallerIdentity {
    pub customer_id: Option<CustomerId>,
    pub phone: Option<Phone>,
}

impl CallerIdentity {
    /// Whether this caller may read the given order's details.
    #[must_use]
    pub fn may_read(&self, order_customer: Option<CustomerId>, order_phone: &Phone) -> bool {
        if let (Some(caller), Some(owner)) = (self.customer_id, order_customer)
            && caller == owner
        {
            return true;
        }
        self.phone.as_ref() == Some(order_phone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_with_matching_customer_id_may_read() {
        let owner = CustomerId::generate();
        let phone = Phone::parse("+55 11 91234-5678").expect("valid phone");
        let caller = CallerIdentity {
            customer_id: Some(owner),
            phone: None,
        };
        assert!(caller.may_read(Some(owner), &phone));
    }

    #[test]
    fn test_caller_with_matching_phone_may_read() {
        let phone = Phone::parse("11912345678").expect("valid phone");
        let caller = CallerIdentity {
            customer_id: None,
            phone: Some(Phone::parse("(11) 91234-5678").expect("valid phone")),
        };
        assert!(caller.may_read(None, &phone));
    }

    #[test]
    fn test_unrelated_caller_may_not_read() {
        let phone = Phone::parse("11912345678").expect("valid phone");
        let caller = CallerIdentity {
            customer_id: Some(CustomerId::generate()),
            phone: Some(Phone::parse("11999990000").expect("valid phone")),
        };
        assert!(!caller.may_read(Some(CustomerId::generate()), &phone));
    }

    #[test]
    fn test_anonymous_caller_may_not_read() {
        let phone = Phone::parse("11912345678").expect("valid phone");
        assert!(!CallerIdentity::default().may_read(None, &phone));
    }
}
