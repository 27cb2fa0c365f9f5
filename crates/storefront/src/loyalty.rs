//! Loyalty balances and the append-only transaction ledger.
//!
//! The denormalized `loyalty_balance` row is adjusted in the same database
//! transaction as every ledger append, so the balance always equals the sum
//! of the customer's transaction amounts. Redemption is a conditional
//! decrement (`WHERE balance_cents >= amount`); zero rows affected means
//! insufficient funds and the caller rolls the surrounding transaction back.

use chrono::{DateTime, Utc};
use quiosque_core::{
    CustomerId, LoyaltyTransactionId, LoyaltyTransactionType, OrderId, OrgId, Price,
};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;

use crate::db::RepositoryError;
use crate::models::loyalty::LoyaltyTransaction;

/// Read/write access to a customer's per-organization loyalty account.
#[derive(Clone)]
pub struct LoyaltyLedger {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: LoyaltyTransactionId,
    customer_id: CustomerId,
    org_id: OrgId,
    order_id: Option<OrderId>,
    amount_cents: Price,
    tx_type: LoyaltyTransactionType,
    description: String,
    created_at: DateTime<Utc>,
}

impl From<TransactionRow> for LoyaltyTransaction {
    fn from(row: TransactionRow) -> Self {
        Self {
            id: row.id,
            customer_id: row.customer_id,
            org_id: row.org_id,
            order_id: row.order_id,
            amount: row.amount_cents,
            tx_type: row.tx_type,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

impl LoyaltyLedger {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Current balance. A customer with no balance row has a zero balance.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] on query failure.
    pub async fn balance(
        &self,
        org: &OrgId,
        customer_id: CustomerId,
    ) -> Result<Price, RepositoryError> {
        let cents = sqlx::query_scalar::<_, i64>(
            "SELECT balance_cents FROM loyalty_balance WHERE customer_id = $1 AND org_id = $2",
        )
        .bind(customer_id)
        .bind(org)
        .fetch_optional(&self.pool)
        .await?
        .unwrap_or(0);
        Ok(Price::from_minor_units(cents))
    }

    /// Credit a customer's account, appending an accrual ledger row and
    /// upserting the balance in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] on query failure.
    #[instrument(skip_all, fields(org = %org, customer_id = %customer_id, amount = %amount))]
    pub async fn accrue(
        &self,
        org: &OrgId,
        customer_id: CustomerId,
        amount: Price,
        order_id: Option<OrderId>,
        description: &str,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        Self::append_transaction(
            &mut tx,
            org,
            customer_id,
            amount,
            LoyaltyTransactionType::Accrual,
            order_id,
            description,
        )
        .await?;

        sqlx::query(
            r"
            INSERT INTO loyalty_balance (customer_id, org_id, balance_cents)
            VALUES ($1, $2, $3)
            ON CONFLICT (customer_id, org_id)
            DO UPDATE SET balance_cents = loyalty_balance.balance_cents + EXCLUDED.balance_cents
            ",
        )
        .bind(customer_id)
        .bind(org)
        .bind(amount)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// The customer's ledger rows for one organization, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] on query failure.
    pub async fn history(
        &self,
        org: &OrgId,
        customer_id: CustomerId,
    ) -> Result<Vec<LoyaltyTransaction>, RepositoryError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r"
            SELECT id, customer_id, org_id, order_id, amount_cents, tx_type,
                   description, created_at
            FROM loyalty_transaction
            WHERE customer_id = $1 AND org_id = $2
            ORDER BY created_at DESC
            ",
        )
        .bind(customer_id)
        .bind(org)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LoyaltyTransaction::from).collect())
    }

    /// Conditionally debit a balance inside a caller-owned transaction.
    ///
    /// Returns `false` (and writes nothing) when the balance is below
    /// `amount`; the caller decides whether to roll back. On success the
    /// matching redemption ledger row is appended in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] on query failure.
    pub async fn redeem_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        org: &OrgId,
        customer_id: CustomerId,
        amount: Price,
        order_id: OrderId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE loyalty_balance
            SET balance_cents = balance_cents - $3
            WHERE customer_id = $1 AND org_id = $2 AND balance_cents >= $3
            ",
        )
        .bind(customer_id)
        .bind(org)
        .bind(amount)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        Self::append_transaction(
            tx,
            org,
            customer_id,
            Price::from_minor_units(-amount.minor_units()),
            LoyaltyTransactionType::Redemption,
            Some(order_id),
            "redeemed at checkout",
        )
        .await?;

        Ok(true)
    }

    async fn append_transaction(
        tx: &mut Transaction<'_, Postgres>,
        org: &OrgId,
        customer_id: CustomerId,
        amount: Price,
        tx_type: LoyaltyTransactionType,
        order_id: Option<OrderId>,
        description: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO loyalty_transaction
                (customer_id, org_id, order_id, amount_cents, tx_type, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(customer_id)
        .bind(org)
        .bind(order_id)
        .bind(amount)
        .bind(tx_type)
        .bind(description)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
