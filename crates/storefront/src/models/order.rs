//! Order aggregate models.

use chrono::{DateTime, Utc};
use quiosque_core::{CustomerId, OrderId, OrderStatus, OrgId, PaymentMethod, Phone, Price, ProductId};
use serde::{Deserialize, Serialize};

use super::cart::LineKey;

/// How the order reaches the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fulfillment {
    Delivery { address: String },
    Pickup,
}

impl Fulfillment {
    /// The delivery address, if this is a delivery order.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Delivery { address } => Some(address),
            Self::Pickup => None,
        }
    }
}

/// A persisted order header plus its line items.
///
/// `status` is advanced by the fulfillment side; the storefront writes the
/// initial `received` and afterwards only observes changes.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub org_id: OrgId,
    pub customer_id: Option<CustomerId>,
    pub customer_name: String,
    pub customer_phone: Phone,
    pub status: OrderStatus,
    /// Inclusive of the delivery fee, net of any loyalty redemption.
    pub total: Price,
    pub payment_method: PaymentMethod,
    pub fulfillment: Fulfillment,
    pub created_at: DateTime<Utc>,
    /// Always non-empty: an order and its items are created together.
    pub items: Vec<OrderItem>,
}

/// Immutable product snapshot taken at order-creation time.
///
/// Decoupled from the live catalog so later price or description changes do
/// not retroactively alter historical orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItem {
    pub line_key: LineKey,
    pub product_id: ProductId,
    pub name: String,
    pub unit_price: Price,
    pub quantity: u32,
    pub notes: String,
}

impl OrderItem {
    /// Line subtotal: unit price times quantity.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.unit_price.times(self.quantity)
    }
}
