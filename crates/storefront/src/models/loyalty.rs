//! Loyalty ledger models.

use chrono::{DateTime, Utc};
use quiosque_core::{CustomerId, LoyaltyTransactionId, LoyaltyTransactionType, OrderId, OrgId, Price};
use serde::Serialize;

/// One append-only ledger row.
///
/// The sign convention: negative amounts are redemptions, positive amounts
/// are accruals. The customer's denormalized balance must always equal the
/// sum of their transaction amounts; every write path that appends a row
/// adjusts the balance in the same transaction.
#[derive(Debug, Clone, Serialize)]
pub struct LoyaltyTransaction {
    pub id: LoyaltyTransactionId,
    pub customer_id: CustomerId,
    pub org_id: OrgId,
    pub order_id: Option<OrderId>,
    /// Signed amount in minor units; negative = redemption.
    pub amount: Price,
    pub tx_type: LoyaltyTransactionType,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
