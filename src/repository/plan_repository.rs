use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{CreatePlanRequest, Plan},
    error::{AppError, Result},
    repository::{customer_repository::parse_uuid, PlanRepository},
};

#[derive(FromRow)]
struct PlanRow {
    id: String,
    reseller_id: String,
    name: String,
    price_cents: i64,
    duration_days: i64,
    created_at: NaiveDateTime,
}

pub struct SqlitePlanRepository {
    pool: SqlitePool,
}

impl SqlitePlanRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_plan(row: PlanRow) -> Result<Plan> {
        Ok(Plan {
            id: parse_uuid(&row.id)?,
            reseller_id: parse_uuid(&row.reseller_id)?,
            name: row.name,
            price_cents: row.price_cents,
            duration_days: row.duration_days,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
        })
    }
}

#[async_trait]
impl PlanRepository for SqlitePlanRepository {
    async fn create(&self, request: CreatePlanRequest) -> Result<Plan> {
        if request.price_cents < 0 || request.duration_days <= 0 {
            return Err(AppError::BadRequest(
                "Plan price must be non-negative and duration positive".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO plans (id, reseller_id, name, price_cents, duration_days, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(request.reseller_id.to_string())
        .bind(&request.name)
        .bind(request.price_cents)
        .bind(request.duration_days)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_by_id(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created plan".to_string())
        })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Plan>> {
        let row = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT id, reseller_id, name, price_cents, duration_days, created_at
            FROM plans
            WHERE id = ?
            "#
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_plan).transpose()
    }

    async fn list_by_reseller(&self, reseller_id: Uuid) -> Result<Vec<Plan>> {
        let rows = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT id, reseller_id, name, price_cents, duration_days, created_at
            FROM plans
            WHERE reseller_id = ?
            ORDER BY price_cents ASC, duration_days ASC
            "#
        )
        .bind(reseller_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_plan)
            .collect()
    }
}
