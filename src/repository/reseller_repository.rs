use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{CreateResellerRequest, Reseller},
    error::{AppError, Result},
    repository::{customer_repository::parse_uuid, ResellerRepository},
};

#[derive(FromRow)]
struct ResellerRow {
    id: String,
    name: String,
    is_admin: bool,
    credits: Option<i64>,
    webhook_secret: Option<String>,
    created_at: NaiveDateTime,
}

pub struct SqliteResellerRepository {
    pool: SqlitePool,
}

impl SqliteResellerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_reseller(row: ResellerRow) -> Result<Reseller> {
        Ok(Reseller {
            id: parse_uuid(&row.id)?,
            name: row.name,
            is_admin: row.is_admin,
            credits: row.credits,
            webhook_secret: row.webhook_secret,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
        })
    }
}

#[async_trait]
impl ResellerRepository for SqliteResellerRepository {
    async fn create(&self, request: CreateResellerRequest) -> Result<Reseller> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO resellers (id, name, is_admin, credits, webhook_secret, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(&request.name)
        .bind(request.is_admin)
        .bind(request.credits)
        .bind(&request.webhook_secret)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created reseller".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Reseller>> {
        let row = sqlx::query_as::<_, ResellerRow>(
            r#"
            SELECT id, name, is_admin, credits, webhook_secret, created_at
            FROM resellers
            WHERE id = ?
            "#
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_reseller).transpose()
    }

    async fn find_by_webhook_secret(&self, secret: &str) -> Result<Option<Reseller>> {
        let row = sqlx::query_as::<_, ResellerRow>(
            r#"
            SELECT id, name, is_admin, credits, webhook_secret, created_at
            FROM resellers
            WHERE webhook_secret = ? AND webhook_secret <> ''
            "#
        )
        .bind(secret)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_reseller).transpose()
    }

    async fn debit_credits(&self, id: Uuid, amount: i64) -> Result<bool> {
        // Check and deduct in one statement; a NULL balance never qualifies.
        let result = sqlx::query(
            r#"
            UPDATE resellers
            SET credits = credits - ?
            WHERE id = ? AND credits IS NOT NULL AND credits >= ?
            "#
        )
        .bind(amount)
        .bind(id.to_string())
        .bind(amount)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn credit_credits(&self, id: Uuid, amount: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE resellers
            SET credits = COALESCE(credits, 0) + ?
            WHERE id = ?
            "#
        )
        .bind(amount)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Reseller not found".to_string()));
        }
        Ok(())
    }
}
