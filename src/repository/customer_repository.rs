use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{CreateCustomerRequest, Customer, CustomerStatus},
    error::{AppError, Result},
    repository::CustomerRepository,
};

// Stored phones carry whatever formatting the reseller typed in; strip the
// usual separators so a digits-only fragment can match with LIKE.
const NORMALIZED_PHONE: &str = "REPLACE(REPLACE(REPLACE(REPLACE(REPLACE(REPLACE(phone, ' ', ''), '-', ''), '(', ''), ')', ''), '+', ''), '.', '')";

#[derive(FromRow)]
struct CustomerRow {
    id: String,
    reseller_id: String,
    name: String,
    phone: String,
    username: Option<String>,
    server_id: Option<String>,
    plan_id: Option<String>,
    custom_price_cents: Option<i64>,
    screens: i64,
    due_date: Option<NaiveDate>,
    status: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqliteCustomerRepository {
    pool: SqlitePool,
}

impl SqliteCustomerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_customer(row: CustomerRow) -> Result<Customer> {
        Ok(Customer {
            id: parse_uuid(&row.id)?,
            reseller_id: parse_uuid(&row.reseller_id)?,
            name: row.name,
            phone: row.phone,
            username: row.username,
            server_id: row.server_id.as_deref().map(parse_uuid).transpose()?,
            plan_id: row.plan_id.as_deref().map(parse_uuid).transpose()?,
            custom_price_cents: row.custom_price_cents,
            screens: row.screens.max(1),
            due_date: row.due_date,
            status: CustomerStatus::from_str(&row.status).ok_or_else(|| {
                AppError::Database(format!("Invalid customer status: {}", row.status))
            })?,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| AppError::Database(e.to_string()))
}

#[async_trait]
impl CustomerRepository for SqliteCustomerRepository {
    async fn create(&self, request: CreateCustomerRequest) -> Result<Customer> {
        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();

        sqlx::query(
            r#"
            INSERT INTO customers (
                id, reseller_id, name, phone, username, server_id, plan_id,
                custom_price_cents, screens, due_date, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(request.reseller_id.to_string())
        .bind(&request.name)
        .bind(&request.phone)
        .bind(&request.username)
        .bind(request.server_id.map(|s| s.to_string()))
        .bind(request.plan_id.map(|p| p.to_string()))
        .bind(request.custom_price_cents)
        .bind(request.screens.max(1))
        .bind(request.due_date)
        .bind(request.status.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created customer".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Customer>> {
        let row = sqlx::query_as::<_, CustomerRow>(
            r#"
            SELECT id, reseller_id, name, phone, username, server_id, plan_id,
                   custom_price_cents, screens, due_date, status, created_at, updated_at
            FROM customers
            WHERE id = ?
            "#
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_customer).transpose()
    }

    async fn search_by_phone(&self, digits: &str) -> Result<Vec<Customer>> {
        let query = format!(
            r#"
            SELECT id, reseller_id, name, phone, username, server_id, plan_id,
                   custom_price_cents, screens, due_date, status, created_at, updated_at
            FROM customers
            WHERE {} LIKE '%' || ? || '%'
            ORDER BY created_at DESC
            "#,
            NORMALIZED_PHONE
        );

        let rows = sqlx::query_as::<_, CustomerRow>(&query)
            .bind(digits)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_customer)
            .collect()
    }
}

/// Sets the new due date and marks the customer active. Returns the number
/// of rows touched.
pub(crate) async fn mark_renewed<'e, E>(executor: E, id: Uuid, due_date: NaiveDate) -> std::result::Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE customers
        SET due_date = ?,
            status = ?,
            updated_at = ?
        WHERE id = ?
        "#
    )
    .bind(due_date)
    .bind(CustomerStatus::Active.as_str())
    .bind(Utc::now().naive_utc())
    .bind(id.to_string())
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}
