//! Read access to persisted orders.

use chrono::{DateTime, Utc};
use quiosque_core::{CustomerId, OrderId, OrderStatus, OrgId, PaymentMethod, Phone, Price, ProductId};
use sqlx::PgPool;

use super::{CallerIdentity, StatusSource};
use crate::db::RepositoryError;
use crate::models::cart::LineKey;
use crate::models::order::{Fulfillment, Order, OrderItem};

/// Fetches order headers, items, and statuses.
#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    org_id: OrgId,
    customer_id: Option<CustomerId>,
    customer_name: String,
    customer_phone: String,
    status: OrderStatus,
    total_cents: Price,
    payment_method: PaymentMethod,
    delivery_address: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    line_key: LineKey,
    product_id: ProductId,
    product_name: String,
    unit_price_cents: Price,
    quantity: i32,
    notes: String,
}

impl TryFrom<ItemRow> for OrderItem {
    type Error = RepositoryError;

    fn try_from(row: ItemRow) -> Result<Self, RepositoryError> {
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "order item {} has non-positive quantity {}",
                row.line_key, row.quantity
            ))
        })?;
        Ok(Self {
            line_key: row.line_key,
            product_id: row.product_id,
            name: row.product_name,
            unit_price: row.unit_price_cents,
            quantity,
            notes: row.notes,
        })
    }
}

impl OrderRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch an order with its items, if the caller may read it.
    ///
    /// An order that exists but belongs to someone else is reported the
    /// same way as one that does not exist, so callers cannot probe which
    /// order ids are live.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::DataCorruption`] if stored rows fail
    /// domain validation, or [`RepositoryError::Database`] on query failure.
    pub async fn get_detail(
        &self,
        order_id: OrderId,
        caller: &CallerIdentity,
    ) -> Result<Option<Order>, RepositoryError> {
        let Some(row) = sqlx::query_as::<_, OrderRow>(
            r"
            SELECT id, org_id, customer_id, customer_name, customer_phone,
                   status, total_cents, payment_method, delivery_address, created_at
            FROM storefront_order
            WHERE id = $1
            ",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let phone = Phone::parse(&row.customer_phone).map_err(|e| {
            RepositoryError::DataCorruption(format!(
                "order {} has invalid stored phone: {e}",
                row.id
            ))
        })?;

        if !caller.may_read(row.customer_id, &phone) {
            return Ok(None);
        }

        let items = sqlx::query_as::<_, ItemRow>(
            r"
            SELECT line_key, product_id, product_name, unit_price_cents, quantity, notes
            FROM order_item
            WHERE order_id = $1
            ORDER BY position
            ",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(OrderItem::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        let fulfillment = match row.delivery_address {
            Some(address) => Fulfillment::Delivery { address },
            None => Fulfillment::Pickup,
        };

        Ok(Some(Order {
            id: row.id,
            org_id: row.org_id,
            customer_id: row.customer_id,
            customer_name: row.customer_name,
            customer_phone: phone,
            status: row.status,
            total: row.total_cents,
            payment_method: row.payment_method,
            fulfillment,
            created_at: row.created_at,
            items,
        }))
    }

    /// Current status of an order, without the authorization gate (used by
    /// the status observer, which is reached via an authorized read).
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Database`] on query failure.
    pub async fn status(&self, order_id: OrderId) -> Result<Option<OrderStatus>, RepositoryError> {
        let status = sqlx::query_scalar::<_, OrderStatus>(
            "SELECT status FROM storefront_order WHERE id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(status)
    }
}

impl StatusSource for OrderRepository {
    fn current_status(
        &self,
        order_id: OrderId,
    ) -> impl Future<Output = Result<Option<OrderStatus>, RepositoryError>> + Send {
        self.status(order_id)
    }
}
