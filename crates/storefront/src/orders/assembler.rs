//! Transactional order assembly.
//!
//! One atomic unit covers the whole checkout: idempotency check,
//! organization fee lookup, order insert, item inserts, and the conditional
//! loyalty debit. Any failure rolls the entire order back, including the
//! loyalty ledger rows, so a customer is never charged points for an order
//! that does not exist. The storage operations sit behind [`CheckoutStore`]
//! so the transactional contract is testable without a database.

use std::sync::Arc;

use quiosque_core::{CustomerId, OrderId, OrderStatus, OrgId, Price};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

use super::{CheckoutError, CheckoutRequest};
use crate::db::RepositoryError;
use crate::loyalty::LoyaltyLedger;
use crate::models::cart::CartLine;
use crate::realtime::Realtime;

/// Outcome of a checkout submission.
#[derive(Debug, Clone, Copy)]
pub struct CheckoutReceipt {
    pub order_id: OrderId,
    /// Authoritative total: subtotal plus delivery fee minus redemption.
    pub total: Price,
    /// True when the idempotency key matched an already-created order and
    /// no new order was written.
    pub replayed: bool,
}

/// Result of attempting the order header insert.
#[derive(Debug, Clone, Copy)]
pub enum OrderInsert {
    Created(OrderId),
    /// The idempotency key is already taken; a concurrent submission with
    /// the same key committed first.
    DuplicateKey,
}

/// The storage operations checkout performs inside one atomic unit.
///
/// Dropping `Tx` without committing must discard every write staged through
/// it. The production implementation is [`PgCheckoutStore`]; tests use an
/// in-memory store with the same roll-back-on-drop contract.
#[allow(async_fn_in_trait)]
pub trait CheckoutStore: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> Result<Self::Tx, RepositoryError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), RepositoryError>;

    /// Order already created under this idempotency key, as seen from
    /// inside the transaction.
    async fn find_order(
        &self,
        tx: &mut Self::Tx,
        idempotency_key: Uuid,
    ) -> Result<Option<(OrderId, Price)>, RepositoryError>;

    /// Order created under this idempotency key, as committed by any other
    /// transaction (used after losing an insert race).
    async fn find_committed_order(
        &self,
        idempotency_key: Uuid,
    ) -> Result<Option<(OrderId, Price)>, RepositoryError>;

    /// The organization's delivery fee, or `None` for an unknown org.
    async fn delivery_fee(
        &self,
        tx: &mut Self::Tx,
        org: &OrgId,
    ) -> Result<Option<Price>, RepositoryError>;

    async fn insert_order(
        &self,
        tx: &mut Self::Tx,
        org: &OrgId,
        request: &CheckoutRequest,
        total: Price,
    ) -> Result<OrderInsert, RepositoryError>;

    /// Conditionally debit the loyalty balance and append the matching
    /// redemption ledger row. Returns `false` (writing nothing) when the
    /// balance is below `amount`.
    async fn debit_loyalty(
        &self,
        tx: &mut Self::Tx,
        org: &OrgId,
        customer_id: CustomerId,
        amount: Price,
        order_id: OrderId,
    ) -> Result<bool, RepositoryError>;

    /// Current balance, for reporting a refused redemption.
    async fn loyalty_balance(
        &self,
        tx: &mut Self::Tx,
        org: &OrgId,
        customer_id: CustomerId,
    ) -> Result<Price, RepositoryError>;

    /// Insert one line snapshot; `position` preserves submission order.
    async fn insert_item(
        &self,
        tx: &mut Self::Tx,
        order_id: OrderId,
        position: i32,
        line: &CartLine,
    ) -> Result<(), RepositoryError>;
}

/// Builds orders out of carts, atomically.
#[derive(Clone)]
pub struct OrderAssembler<S = PgCheckoutStore> {
    store: S,
    realtime: Arc<Realtime>,
}

impl<S: CheckoutStore> OrderAssembler<S> {
    #[must_use]
    pub const fn new(store: S, realtime: Arc<Realtime>) -> Self {
        Self { store, realtime }
    }

    /// Create an order from a checkout submission.
    ///
    /// Resubmitting with the same idempotency key returns the original
    /// order's receipt instead of creating a duplicate, whether the replay
    /// races the first attempt or arrives long after it.
    ///
    /// # Errors
    ///
    /// Returns a [`CheckoutError`] describing why the submission was
    /// refused; on any error no rows are written.
    #[instrument(skip_all, fields(org = %org, idempotency_key = %request.idempotency_key))]
    pub async fn place_order(
        &self,
        org: &OrgId,
        request: CheckoutRequest,
    ) -> Result<CheckoutReceipt, CheckoutError> {
        validate(&request)?;

        let mut tx = self.store.begin().await?;

        if let Some((order_id, total)) = self
            .store
            .find_order(&mut tx, request.idempotency_key)
            .await?
        {
            return Ok(CheckoutReceipt {
                order_id,
                total,
                replayed: true,
            });
        }

        let Some(delivery_fee) = self.store.delivery_fee(&mut tx, org).await? else {
            return Err(CheckoutError::OrgNotFound(org.to_string()));
        };

        let subtotal: Price = request.lines.iter().map(CartLine::subtotal).sum();
        let fee = if request.fulfillment.address().is_some() {
            delivery_fee
        } else {
            Price::ZERO
        };
        let gross = subtotal.plus(fee);
        if request.loyalty_redeem > gross {
            return Err(CheckoutError::InvalidAmount(format!(
                "redemption {} exceeds order total {gross}",
                request.loyalty_redeem
            )));
        }
        let total = gross.minus(request.loyalty_redeem);

        let order_id = match self.store.insert_order(&mut tx, org, &request, total).await? {
            OrderInsert::Created(order_id) => order_id,
            OrderInsert::DuplicateKey => {
                // A concurrent submission with the same key won the race;
                // drop our transaction and return its order.
                drop(tx);
                return self
                    .store
                    .find_committed_order(request.idempotency_key)
                    .await?
                    .map(|(order_id, total)| CheckoutReceipt {
                        order_id,
                        total,
                        replayed: true,
                    })
                    .ok_or_else(|| {
                        RepositoryError::Conflict(
                            "idempotency key conflict with no visible order".to_owned(),
                        )
                        .into()
                    });
            }
        };

        if request.loyalty_redeem.minor_units() > 0 {
            // Validation guarantees customer_id is present when redeeming.
            let Some(customer_id) = request.customer.customer_id else {
                return Err(CheckoutError::RedemptionRequiresAuth);
            };
            let debited = self
                .store
                .debit_loyalty(&mut tx, org, customer_id, request.loyalty_redeem, order_id)
                .await?;
            if !debited {
                let available = self.store.loyalty_balance(&mut tx, org, customer_id).await?;
                return Err(CheckoutError::InsufficientBalance {
                    requested: request.loyalty_redeem,
                    available,
                });
            }
        }

        for (position, line) in request.lines.iter().enumerate() {
            let position = i32::try_from(position).unwrap_or(i32::MAX);
            self.store
                .insert_item(&mut tx, order_id, position, line)
                .await?;
        }

        self.store.commit(tx).await?;

        tracing::info!(
            order_id = %order_id,
            org = %org,
            total = %total,
            "order created"
        );
        self.realtime
            .publish_order_status(order_id, OrderStatus::Received);

        Ok(CheckoutReceipt {
            order_id,
            total,
            replayed: false,
        })
    }
}

fn validate(request: &CheckoutRequest) -> Result<(), CheckoutError> {
    if request.lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    if request.customer.name.trim().is_empty() {
        return Err(CheckoutError::MissingCustomerInfo(
            "customer name is required".to_owned(),
        ));
    }
    if request.loyalty_redeem.minor_units() < 0 {
        return Err(CheckoutError::InvalidAmount(
            "redemption amount cannot be negative".to_owned(),
        ));
    }
    if request.loyalty_redeem.minor_units() > 0 && request.customer.customer_id.is_none() {
        return Err(CheckoutError::RedemptionRequiresAuth);
    }
    if let crate::models::order::Fulfillment::Delivery { address } = &request.fulfillment
        && address.trim().is_empty()
    {
        return Err(CheckoutError::MissingCustomerInfo(
            "delivery address is required".to_owned(),
        ));
    }
    Ok(())
}

/// Postgres-backed checkout storage (`storefront_order` / `order_item` plus
/// the loyalty ledger tables).
#[derive(Clone)]
pub struct PgCheckoutStore {
    pool: PgPool,
}

impl PgCheckoutStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CheckoutStore for PgCheckoutStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx, RepositoryError> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), RepositoryError> {
        Ok(tx.commit().await?)
    }

    async fn find_order(
        &self,
        tx: &mut Self::Tx,
        idempotency_key: Uuid,
    ) -> Result<Option<(OrderId, Price)>, RepositoryError> {
        let row = sqlx::query_as::<_, (OrderId, Price)>(
            "SELECT id, total_cents FROM storefront_order WHERE idempotency_key = $1",
        )
        .bind(idempotency_key)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row)
    }

    async fn find_committed_order(
        &self,
        idempotency_key: Uuid,
    ) -> Result<Option<(OrderId, Price)>, RepositoryError> {
        let row = sqlx::query_as::<_, (OrderId, Price)>(
            "SELECT id, total_cents FROM storefront_order WHERE idempotency_key = $1",
        )
        .bind(idempotency_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delivery_fee(
        &self,
        tx: &mut Self::Tx,
        org: &OrgId,
    ) -> Result<Option<Price>, RepositoryError> {
        let fee = sqlx::query_scalar::<_, Price>(
            "SELECT delivery_fee_cents FROM organization WHERE id = $1",
        )
        .bind(org)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(fee)
    }

    async fn insert_order(
        &self,
        tx: &mut Self::Tx,
        org: &OrgId,
        request: &CheckoutRequest,
        total: Price,
    ) -> Result<OrderInsert, RepositoryError> {
        let result = sqlx::query_scalar::<_, OrderId>(
            r"
            INSERT INTO storefront_order
                (org_id, customer_id, customer_name, customer_phone, status,
                 total_cents, payment_method, delivery_address, idempotency_key)
            VALUES ($1, $2, $3, $4, 'received', $5, $6, $7, $8)
            RETURNING id
            ",
        )
        .bind(org)
        .bind(request.customer.customer_id)
        .bind(request.customer.name.trim())
        .bind(request.customer.phone.as_str())
        .bind(total)
        .bind(request.payment_method)
        .bind(request.fulfillment.address())
        .bind(request.idempotency_key)
        .fetch_one(&mut **tx)
        .await;

        match result {
            Ok(order_id) => Ok(OrderInsert::Created(order_id)),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Ok(OrderInsert::DuplicateKey)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn debit_loyalty(
        &self,
        tx: &mut Self::Tx,
        org: &OrgId,
        customer_id: CustomerId,
        amount: Price,
        order_id: OrderId,
    ) -> Result<bool, RepositoryError> {
        LoyaltyLedger::redeem_in_tx(tx, org, customer_id, amount, order_id).await
    }

    async fn loyalty_balance(
        &self,
        tx: &mut Self::Tx,
        org: &OrgId,
        customer_id: CustomerId,
    ) -> Result<Price, RepositoryError> {
        let cents = sqlx::query_scalar::<_, i64>(
            "SELECT balance_cents FROM loyalty_balance WHERE customer_id = $1 AND org_id = $2",
        )
        .bind(customer_id)
        .bind(org)
        .fetch_optional(&mut **tx)
        .await?
        .unwrap_or(0);
        Ok(Price::from_minor_units(cents))
    }

    async fn insert_item(
        &self,
        tx: &mut Self::Tx,
        order_id: OrderId,
        position: i32,
        line: &CartLine,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO order_item
                (order_id, line_key, position, product_id, product_name,
                 unit_price_cents, quantity, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(order_id)
        .bind(line.key)
        .bind(position)
        .bind(line.product.product_id)
        .bind(&line.product.name)
        .bind(line.product.unit_price)
        .bind(i64::from(line.quantity))
        .bind(&line.notes)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Mutex, PoisonError};

    use quiosque_core::{PaymentMethod, Phone, ProductId};

    use super::*;
    use crate::models::cart::ProductSnapshot;
    use crate::models::order::Fulfillment;
    use crate::orders::CustomerDetails;

    /// Committed checkout state for the in-memory store.
    #[derive(Default)]
    struct CommittedState {
        fees: HashMap<String, Price>,
        balances: HashMap<CustomerId, i64>,
        /// idempotency key -> (order id, total)
        orders: HashMap<Uuid, (OrderId, Price)>,
        items: HashMap<OrderId, Vec<(i32, CartLine)>>,
        /// (customer, signed amount in minor units, order)
        ledger: Vec<(CustomerId, i64, OrderId)>,
    }

    /// Writes staged by one in-flight checkout; dropped means rolled back.
    #[derive(Default)]
    struct StagedTx {
        order: Option<(Uuid, OrderId, Price)>,
        items: Vec<(OrderId, i32, CartLine)>,
        debits: Vec<(CustomerId, i64, OrderId)>,
    }

    /// In-memory checkout store: writes only become visible on commit.
    #[derive(Clone, Default)]
    struct MemoryCheckoutStore {
        state: Arc<Mutex<CommittedState>>,
    }

    impl MemoryCheckoutStore {
        fn with_org(fee_cents: i64) -> Self {
            let store = Self::default();
            store
                .lock()
                .fees
                .insert("foodtruck".to_owned(), Price::from_minor_units(fee_cents));
            store
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, CommittedState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        fn set_balance(&self, customer_id: CustomerId, cents: i64) {
            self.lock().balances.insert(customer_id, cents);
        }

        fn balance_of(&self, customer_id: CustomerId) -> i64 {
            self.lock().balances.get(&customer_id).copied().unwrap_or(0)
        }

        fn order_count(&self) -> usize {
            self.lock().orders.len()
        }

        fn items_of(&self, order_id: OrderId) -> Vec<(i32, CartLine)> {
            self.lock().items.get(&order_id).cloned().unwrap_or_default()
        }

        fn item_count(&self) -> usize {
            self.lock().items.values().map(Vec::len).sum()
        }

        fn ledger(&self) -> Vec<(CustomerId, i64, OrderId)> {
            self.lock().ledger.clone()
        }
    }

    impl CheckoutStore for MemoryCheckoutStore {
        type Tx = StagedTx;

        async fn begin(&self) -> Result<StagedTx, RepositoryError> {
            Ok(StagedTx::default())
        }

        async fn commit(&self, tx: StagedTx) -> Result<(), RepositoryError> {
            let mut state = self.lock();
            if let Some((key, order_id, total)) = tx.order {
                state.orders.insert(key, (order_id, total));
            }
            for (order_id, position, line) in tx.items {
                state.items.entry(order_id).or_default().push((position, line));
            }
            for (customer_id, cents, order_id) in tx.debits {
                *state.balances.entry(customer_id).or_insert(0) -= cents;
                state.ledger.push((customer_id, -cents, order_id));
            }
            Ok(())
        }

        async fn find_order(
            &self,
            _tx: &mut StagedTx,
            idempotency_key: Uuid,
        ) -> Result<Option<(OrderId, Price)>, RepositoryError> {
            Ok(self.lock().orders.get(&idempotency_key).copied())
        }

        async fn find_committed_order(
            &self,
            idempotency_key: Uuid,
        ) -> Result<Option<(OrderId, Price)>, RepositoryError> {
            Ok(self.lock().orders.get(&idempotency_key).copied())
        }

        async fn delivery_fee(
            &self,
            _tx: &mut StagedTx,
            org: &OrgId,
        ) -> Result<Option<Price>, RepositoryError> {
            Ok(self.lock().fees.get(org.as_str()).copied())
        }

        async fn insert_order(
            &self,
            tx: &mut StagedTx,
            _org: &OrgId,
            request: &CheckoutRequest,
            total: Price,
        ) -> Result<OrderInsert, RepositoryError> {
            if self.lock().orders.contains_key(&request.idempotency_key) {
                return Ok(OrderInsert::DuplicateKey);
            }
            let order_id = OrderId::generate();
            tx.order = Some((request.idempotency_key, order_id, total));
            Ok(OrderInsert::Created(order_id))
        }

        async fn debit_loyalty(
            &self,
            tx: &mut StagedTx,
            _org: &OrgId,
            customer_id: CustomerId,
            amount: Price,
            order_id: OrderId,
        ) -> Result<bool, RepositoryError> {
            if self.balance_of(customer_id) < amount.minor_units() {
                return Ok(false);
            }
            tx.debits.push((customer_id, amount.minor_units(), order_id));
            Ok(true)
        }

        async fn loyalty_balance(
            &self,
            _tx: &mut StagedTx,
            _org: &OrgId,
            customer_id: CustomerId,
        ) -> Result<Price, RepositoryError> {
            Ok(Price::from_minor_units(self.balance_of(customer_id)))
        }

        async fn insert_item(
            &self,
            tx: &mut StagedTx,
            order_id: OrderId,
            position: i32,
            line: &CartLine,
        ) -> Result<(), RepositoryError> {
            tx.items.push((order_id, position, line.clone()));
            Ok(())
        }
    }

    fn org() -> OrgId {
        OrgId::parse("foodtruck").expect("valid slug")
    }

    fn line(name: &str, cents: i64, quantity: u32) -> CartLine {
        CartLine::new(
            ProductSnapshot {
                product_id: ProductId::generate(),
                name: name.to_owned(),
                unit_price: Price::from_minor_units(cents),
            },
            quantity,
            "",
        )
    }

    fn request(lines: Vec<CartLine>) -> CheckoutRequest {
        CheckoutRequest {
            customer: CustomerDetails {
                customer_id: None,
                name: "Maria".to_owned(),
                phone: Phone::parse("11912345678").expect("valid phone"),
            },
            payment_method: PaymentMethod::Pix,
            fulfillment: Fulfillment::Pickup,
            lines,
            loyalty_redeem: Price::ZERO,
            idempotency_key: Uuid::new_v4(),
        }
    }

    fn assembler(store: &MemoryCheckoutStore) -> OrderAssembler<MemoryCheckoutStore> {
        OrderAssembler::new(store.clone(), Arc::new(Realtime::new()))
    }

    #[test]
    fn test_empty_cart_is_refused() {
        let err = validate(&request(Vec::new())).expect_err("empty cart");
        assert!(matches!(err, CheckoutError::EmptyCart));
    }

    #[test]
    fn test_blank_name_is_refused() {
        let mut req = request(vec![line("Dogão Clássico", 1500, 1)]);
        req.customer.name = "   ".to_owned();
        let err = validate(&req).expect_err("blank name");
        assert!(matches!(err, CheckoutError::MissingCustomerInfo(_)));
    }

    #[test]
    fn test_negative_redemption_is_refused() {
        let mut req = request(vec![line("Dogão Clássico", 1500, 1)]);
        req.loyalty_redeem = Price::from_minor_units(-100);
        let err = validate(&req).expect_err("negative redemption");
        assert!(matches!(err, CheckoutError::InvalidAmount(_)));
    }

    #[test]
    fn test_guest_redemption_is_refused() {
        let mut req = request(vec![line("Dogão Clássico", 1500, 1)]);
        req.loyalty_redeem = Price::from_minor_units(500);
        let err = validate(&req).expect_err("guest redemption");
        assert!(matches!(err, CheckoutError::RedemptionRequiresAuth));
    }

    #[test]
    fn test_delivery_without_address_is_refused() {
        let mut req = request(vec![line("Dogão Clássico", 1500, 1)]);
        req.fulfillment = Fulfillment::Delivery {
            address: String::new(),
        };
        let err = validate(&req).expect_err("blank address");
        assert!(matches!(err, CheckoutError::MissingCustomerInfo(_)));
    }

    #[tokio::test]
    async fn test_order_and_items_commit_together_in_submission_order() {
        let store = MemoryCheckoutStore::with_org(500);
        let receipt = assembler(&store)
            .place_order(
                &org(),
                request(vec![
                    line("Dogão Clássico", 1500, 2),
                    line("Coca-Cola", 650, 1),
                ]),
            )
            .await
            .expect("checkout");

        assert!(!receipt.replayed);
        assert_eq!(receipt.total.minor_units(), 3650);
        assert_eq!(store.order_count(), 1);

        let items = store.items_of(receipt.order_id);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].0, 0);
        assert_eq!(items[0].1.product.name, "Dogão Clássico");
        assert_eq!(items[1].0, 1);
        assert_eq!(items[1].1.product.name, "Coca-Cola");
    }

    #[tokio::test]
    async fn test_delivery_fee_applies_only_to_delivery_orders() {
        let store = MemoryCheckoutStore::with_org(500);
        let mut req = request(vec![
            line("Dogão Clássico", 1500, 2),
            line("Coca-Cola", 650, 1),
        ]);
        req.fulfillment = Fulfillment::Delivery {
            address: "Rua das Flores 123".to_owned(),
        };
        let receipt = assembler(&store)
            .place_order(&org(), req)
            .await
            .expect("checkout");

        // 2 × 15.00 + 6.50 + 5.00 fee
        assert_eq!(receipt.total.minor_units(), 4150);
    }

    #[tokio::test]
    async fn test_redemption_debits_balance_and_appends_ledger_row() {
        let store = MemoryCheckoutStore::with_org(500);
        let customer_id = CustomerId::generate();
        store.set_balance(customer_id, 2500);

        let mut req = request(vec![line("Dogão Clássico", 1500, 2)]);
        req.customer.customer_id = Some(customer_id);
        req.loyalty_redeem = Price::from_minor_units(1000);

        let receipt = assembler(&store)
            .place_order(&org(), req)
            .await
            .expect("checkout");

        assert_eq!(receipt.total.minor_units(), 2000);
        assert_eq!(store.balance_of(customer_id), 1500);

        let ledger = store.ledger();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0], (customer_id, -1000, receipt.order_id));
    }

    #[tokio::test]
    async fn test_insufficient_balance_rolls_everything_back() {
        let store = MemoryCheckoutStore::with_org(500);
        let customer_id = CustomerId::generate();
        store.set_balance(customer_id, 500);

        let mut req = request(vec![line("Dogão Clássico", 1500, 2)]);
        req.customer.customer_id = Some(customer_id);
        req.loyalty_redeem = Price::from_minor_units(1000);

        let err = assembler(&store)
            .place_order(&org(), req)
            .await
            .expect_err("insufficient balance");
        let CheckoutError::InsufficientBalance {
            requested,
            available,
        } = err
        else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(requested.minor_units(), 1000);
        assert_eq!(available.minor_units(), 500);

        // The refused checkout must leave no trace.
        assert_eq!(store.order_count(), 0);
        assert_eq!(store.item_count(), 0);
        assert!(store.ledger().is_empty());
        assert_eq!(store.balance_of(customer_id), 500);
    }

    #[tokio::test]
    async fn test_replay_returns_original_order_without_writing() {
        let store = MemoryCheckoutStore::with_org(500);
        let req = request(vec![line("Dogão Clássico", 1500, 1)]);
        let key = req.idempotency_key;

        let first = assembler(&store)
            .place_order(&org(), req)
            .await
            .expect("first checkout");

        let mut replay = request(vec![line("Dogão Clássico", 1500, 1)]);
        replay.idempotency_key = key;
        let second = assembler(&store)
            .place_order(&org(), replay)
            .await
            .expect("replay");

        assert!(second.replayed);
        assert_eq!(second.order_id, first.order_id);
        assert_eq!(second.total, first.total);
        assert_eq!(store.order_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_org_is_refused_and_writes_nothing() {
        let store = MemoryCheckoutStore::default();
        let err = assembler(&store)
            .place_order(&org(), request(vec![line("Dogão Clássico", 1500, 1)]))
            .await
            .expect_err("unknown org");
        assert!(matches!(err, CheckoutError::OrgNotFound(_)));
        assert_eq!(store.order_count(), 0);
        assert_eq!(store.item_count(), 0);
    }
}
