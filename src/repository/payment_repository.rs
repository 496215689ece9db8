use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::Payment,
    error::{AppError, Result},
    repository::{customer_repository::parse_uuid, PaymentRepository},
};

#[derive(FromRow)]
struct PaymentRow {
    id: String,
    customer_id: String,
    amount_cents: i64,
    method: String,
    confirmed: bool,
    payment_date: NaiveDateTime,
    external_id: Option<String>,
    source: Option<String>,
}

pub struct SqlitePaymentRepository {
    pool: SqlitePool,
}

impl SqlitePaymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_payment(row: PaymentRow) -> Result<Payment> {
        Ok(Payment {
            id: parse_uuid(&row.id)?,
            customer_id: parse_uuid(&row.customer_id)?,
            amount_cents: row.amount_cents,
            method: row.method,
            confirmed: row.confirmed,
            payment_date: DateTime::from_naive_utc_and_offset(row.payment_date, Utc),
            external_id: row.external_id,
            source: row.source,
        })
    }
}

#[async_trait]
impl PaymentRepository for SqlitePaymentRepository {
    async fn create(&self, payment: Payment) -> Result<Payment> {
        insert_payment(&self.pool, &payment)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(payment)
    }

    async fn find_by_customer(&self, customer_id: Uuid) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, customer_id, amount_cents, method, confirmed,
                   payment_date, external_id, source
            FROM payments
            WHERE customer_id = ?
            ORDER BY payment_date DESC
            "#
        )
        .bind(customer_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_payment)
            .collect()
    }

    async fn find_recent_confirmed(
        &self,
        customer_id: Uuid,
        method: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, customer_id, amount_cents, method, confirmed,
                   payment_date, external_id, source
            FROM payments
            WHERE customer_id = ?
              AND method = ?
              AND confirmed = 1
              AND payment_date >= ?
            ORDER BY payment_date DESC
            "#
        )
        .bind(customer_id.to_string())
        .bind(method)
        .bind(since.naive_utc())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_payment)
            .collect()
    }

    async fn find_by_external_id(
        &self,
        customer_id: Uuid,
        external_id: &str,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, customer_id, amount_cents, method, confirmed,
                   payment_date, external_id, source
            FROM payments
            WHERE customer_id = ? AND external_id = ?
            LIMIT 1
            "#
        )
        .bind(customer_id.to_string())
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_payment).transpose()
    }
}

pub(crate) async fn insert_payment<'e, E>(executor: E, payment: &Payment) -> std::result::Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, customer_id, amount_cents, method, confirmed,
            payment_date, external_id, source
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#
    )
    .bind(payment.id.to_string())
    .bind(payment.customer_id.to_string())
    .bind(payment.amount_cents)
    .bind(payment.method.clone())
    .bind(payment.confirmed)
    .bind(payment.payment_date.naive_utc())
    .bind(payment.external_id.clone())
    .bind(payment.source.clone())
    .execute(executor)
    .await?;

    Ok(())
}
