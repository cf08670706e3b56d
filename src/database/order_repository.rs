use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::error::{AppError, AppResult};
use crate::orders::{Order, OrderRepository, OrderStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS gateway_orders (
    id BIGINT PRIMARY KEY,
    total NUMERIC(14, 2) NOT NULL,
    status TEXT NOT NULL,
    payment_method TEXT,
    meta JSONB NOT NULL DEFAULT '{}'::jsonb,
    notes JSONB NOT NULL DEFAULT '[]'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)";

const COLUMNS: &str = "id, total, status, payment_method, meta, notes, created_at, updated_at";

#[derive(Debug, FromRow)]
struct OrderRow {
    id: i64,
    total: Decimal,
    status: String,
    payment_method: Option<String>,
    meta: Json<HashMap<String, String>>,
    notes: Json<Vec<String>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = DatabaseError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let decode = |message: String| DatabaseError::new(DatabaseErrorKind::Decode { message });

        Ok(Order {
            id: u64::try_from(row.id).map_err(|e| decode(format!("id {}: {}", row.id, e)))?,
            total: row.total,
            status: row.status.parse::<OrderStatus>().map_err(decode)?,
            payment_method: row.payment_method,
            meta: row.meta.0,
            notes: row.notes.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn db_id(id: u64) -> AppResult<i64> {
    i64::try_from(id).map_err(|_| AppError::validation(format!("Order id {} is out of range", id)))
}

/// Order store backed by the `gateway_orders` table
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the orders table when missing
    pub async fn ensure_schema(&self) -> Result<(), DatabaseError> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from)?;
        Ok(())
    }

    /// Run an UPDATE touching one order, failing if it does not exist
    async fn update_one<'q>(
        &self,
        query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        id: u64,
        context: &str,
    ) -> AppResult<()> {
        let result = query.execute(&self.pool).await.map_err(|e| {
            AppError::from(DatabaseError::from(e).with_context(context.to_string()))
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Order", id));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn find_by_id(&self, id: u64) -> AppResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM gateway_orders WHERE id = $1",
            COLUMNS
        ))
        .bind(db_id(id)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        Ok(row.map(Order::try_from).transpose()?)
    }

    async fn insert(&self, order: &Order) -> AppResult<Order> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "INSERT INTO gateway_orders (id, total, status, payment_method, meta, notes, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {}",
            COLUMNS
        ))
        .bind(db_id(order.id)?)
        .bind(order.total)
        .bind(order.status.as_str())
        .bind(&order.payment_method)
        .bind(Json(&order.meta))
        .bind(Json(&order.notes))
        .bind(order.created_at)
        .bind(order.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from)?;

        Ok(Order::try_from(row)?)
    }

    async fn update_meta(&self, id: u64, entries: &[(&str, &str)]) -> AppResult<()> {
        let entries: HashMap<&str, &str> = entries.iter().copied().collect();
        let query = sqlx::query(
            "UPDATE gateway_orders SET meta = meta || $2, updated_at = now() WHERE id = $1",
        )
        .bind(db_id(id)?)
        .bind(Json(entries));
        self.update_one(query, id, "update_meta").await
    }

    async fn set_status(&self, id: u64, status: OrderStatus) -> AppResult<()> {
        let query =
            sqlx::query("UPDATE gateway_orders SET status = $2, updated_at = now() WHERE id = $1")
                .bind(db_id(id)?)
                .bind(status.as_str());
        self.update_one(query, id, "set_status").await
    }

    async fn set_payment_method(&self, id: u64, payment_method: &str) -> AppResult<()> {
        let query = sqlx::query(
            "UPDATE gateway_orders SET payment_method = $2, updated_at = now() WHERE id = $1",
        )
        .bind(db_id(id)?)
        .bind(payment_method.to_string());
        self.update_one(query, id, "set_payment_method").await
    }

    async fn add_note(&self, id: u64, note: &str) -> AppResult<()> {
        let query = sqlx::query(
            "UPDATE gateway_orders SET notes = notes || $2, updated_at = now() WHERE id = $1",
        )
        .bind(db_id(id)?)
        .bind(Json(vec![note.to_string()]));
        self.update_one(query, id, "add_note").await
    }
}
