//! Order persistence: the only durable state the reconciliation engine
//! touches. The store is kept behind a trait so the engine can be exercised
//! against an in-memory implementation in tests.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::error::DatabaseError;

/// Store-level order status. The engine folds these into four logical classes:
/// unprocessed, pending-confirmation, paid, terminally-failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    OnHold,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::OnHold => "on-hold",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DatabaseError> {
        match value {
            "pending" => Ok(OrderStatus::Pending),
            "on-hold" => Ok(OrderStatus::OnHold),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "failed" => Ok(OrderStatus::Failed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DatabaseError::Corrupt(format!(
                "unknown order status: {other}"
            ))),
        }
    }

    /// Success class: the payment outcome has already been applied.
    pub fn is_paid(&self) -> bool {
        matches!(self, OrderStatus::Processing | OrderStatus::Completed)
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, OrderStatus::Failed | OrderStatus::Cancelled)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One storefront order, as seen by the gateway.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: i64,
    /// Per-order opaque token echoed back by the platform; a mismatch means a
    /// forged or misrouted notification.
    pub secret_token: String,
    pub status: OrderStatus,
    /// Last transaction id recorded for this order; distinguishes a fresh
    /// retry from a redelivery of a known attempt.
    pub trans_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub country: String,
    pub customer_email: Option<String>,
    pub card_brand: Option<String>,
    pub card_expiry: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct OrderRow {
    id: i64,
    secret_token: String,
    status: String,
    trans_id: Option<String>,
    amount: i64,
    currency: String,
    country: String,
    customer_email: Option<String>,
    card_brand: Option<String>,
    card_expiry: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DatabaseError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            secret_token: row.secret_token,
            status: OrderStatus::parse(&row.status)?,
            trans_id: row.trans_id,
            amount: row.amount,
            currency: row.currency,
            country: row.country,
            customer_email: row.customer_email,
            card_brand: row.card_brand,
            card_expiry: row.card_expiry,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Transaction facts persisted onto the order when a fresh attempt is
/// reconciled, overwriting whatever a prior failed attempt left behind.
#[derive(Debug, Clone)]
pub struct TransactionFacts {
    pub trans_id: String,
    pub card_brand: Option<String>,
    pub card_expiry: Option<String>,
}

/// Read/write access to order state, keyed by order id plus the order-specific
/// secret token checked by the caller.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_order(&self, order_id: i64) -> Result<Option<Order>, DatabaseError>;

    async fn save_transaction_facts(
        &self,
        order_id: i64,
        facts: &TransactionFacts,
    ) -> Result<(), DatabaseError>;

    /// Append a line to the order's audit trail.
    async fn append_note(&self, order_id: i64, note: &str) -> Result<(), DatabaseError>;

    /// Atomic compare-and-set on `(status, trans_id)`. Returns false when the
    /// row no longer matches the expectation, which means a concurrent
    /// delivery won the race. A transition into the paid class is the store's
    /// cue to fire downstream side effects (stock, mails) exactly once.
    async fn transition_status(
        &self,
        order_id: i64,
        expected_status: OrderStatus,
        expected_trans_id: Option<&str>,
        next_status: OrderStatus,
    ) -> Result<bool, DatabaseError>;

    /// Drop the in-flight cart tied to the order (browser channel only).
    async fn clear_cart(&self, order_id: i64) -> Result<(), DatabaseError>;
}

/// Postgres-backed order store.
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a pending order, issuing its secret token.
    pub async fn create_order(
        &self,
        amount: i64,
        currency: &str,
        country: &str,
        customer_email: Option<&str>,
    ) -> Result<Order, DatabaseError> {
        let secret_token = Uuid::new_v4().to_string();
        let row = sqlx::query_as::<_, OrderRow>(
            "INSERT INTO orders (secret_token, status, amount, currency, country, customer_email)
             VALUES ($1, 'pending', $2, $3, $4, $5)
             RETURNING id, secret_token, status, trans_id, amount, currency, country,
                       customer_email, card_brand, card_expiry, created_at, updated_at",
        )
        .bind(&secret_token)
        .bind(amount)
        .bind(currency)
        .bind(country)
        .bind(customer_email)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Order::try_from(row)
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn find_order(&self, order_id: i64) -> Result<Option<Order>, DatabaseError> {
        let row = sqlx::query_as::<_, OrderRow>(
            "SELECT id, secret_token, status, trans_id, amount, currency, country,
                    customer_email, card_brand, card_expiry, created_at, updated_at
             FROM orders WHERE id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        row.map(Order::try_from).transpose()
    }

    async fn save_transaction_facts(
        &self,
        order_id: i64,
        facts: &TransactionFacts,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE orders
             SET trans_id = $2, card_brand = $3, card_expiry = $4, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(order_id)
        .bind(&facts.trans_id)
        .bind(&facts.card_brand)
        .bind(&facts.card_expiry)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn append_note(&self, order_id: i64, note: &str) -> Result<(), DatabaseError> {
        sqlx::query("INSERT INTO order_notes (order_id, note) VALUES ($1, $2)")
            .bind(order_id)
            .bind(note)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }

    async fn transition_status(
        &self,
        order_id: i64,
        expected_status: OrderStatus,
        expected_trans_id: Option<&str>,
        next_status: OrderStatus,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, updated_at = NOW()
             WHERE id = $1 AND status = $3 AND trans_id IS NOT DISTINCT FROM $4",
        )
        .bind(order_id)
        .bind(next_status.as_str())
        .bind(expected_status.as_str())
        .bind(expected_trans_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(result.rows_affected() == 1)
    }

    async fn clear_cart(&self, order_id: i64) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM cart_items WHERE order_id = $1")
            .bind(order_id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }
}
