use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{CreatePanelProviderRequest, PanelFamily, PanelProvider, Server},
    error::{AppError, Result},
    repository::{customer_repository::parse_uuid, ServerRepository},
};

#[derive(FromRow)]
struct ServerRow {
    id: String,
    reseller_id: String,
    name: String,
    host: String,
    created_at: NaiveDateTime,
}

#[derive(FromRow)]
struct ProviderRow {
    id: String,
    reseller_id: String,
    family: String,
    name: String,
    base_url: Option<String>,
    api_key: Option<String>,
    database_url: Option<String>,
    department: Option<String>,
    keywords: String,
    enabled: bool,
    auto_renew: bool,
}

pub struct SqliteServerRepository {
    pool: SqlitePool,
}

impl SqliteServerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_server(row: ServerRow) -> Result<Server> {
        Ok(Server {
            id: parse_uuid(&row.id)?,
            reseller_id: parse_uuid(&row.reseller_id)?,
            name: row.name,
            host: row.host,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
        })
    }

    fn row_to_provider(row: ProviderRow) -> Result<PanelProvider> {
        Ok(PanelProvider {
            id: parse_uuid(&row.id)?,
            reseller_id: parse_uuid(&row.reseller_id)?,
            family: PanelFamily::from_str(&row.family).ok_or_else(|| {
                AppError::Database(format!("Invalid panel family: {}", row.family))
            })?,
            name: row.name,
            base_url: row.base_url,
            api_key: row.api_key,
            database_url: row.database_url,
            department: row.department,
            keywords: row
                .keywords
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_lowercase)
                .collect(),
            enabled: row.enabled,
            auto_renew: row.auto_renew,
        })
    }
}

#[async_trait]
impl ServerRepository for SqliteServerRepository {
    async fn create_server(&self, reseller_id: Uuid, name: &str, host: &str) -> Result<Server> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO servers (id, reseller_id, name, host, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(reseller_id.to_string())
        .bind(name)
        .bind(host)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        self.find_server(id).await?.ok_or_else(|| {
            AppError::Database("Failed to retrieve created server".to_string())
        })
    }

    async fn find_server(&self, id: Uuid) -> Result<Option<Server>> {
        let row = sqlx::query_as::<_, ServerRow>(
            "SELECT id, reseller_id, name, host, created_at FROM servers WHERE id = ?"
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        row.map(Self::row_to_server).transpose()
    }

    async fn create_provider(&self, request: CreatePanelProviderRequest) -> Result<PanelProvider> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO panel_providers (
                id, reseller_id, family, name, base_url, api_key, database_url,
                department, keywords, enabled, auto_renew, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(id.to_string())
        .bind(request.reseller_id.to_string())
        .bind(request.family.as_str())
        .bind(&request.name)
        .bind(&request.base_url)
        .bind(&request.api_key)
        .bind(&request.database_url)
        .bind(&request.department)
        .bind(request.keywords.join(","))
        .bind(request.enabled)
        .bind(request.auto_renew)
        .bind(Utc::now().naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let row = sqlx::query_as::<_, ProviderRow>(
            r#"
            SELECT id, reseller_id, family, name, base_url, api_key, database_url,
                   department, keywords, enabled, auto_renew
            FROM panel_providers
            WHERE id = ?
            "#
        )
        .bind(id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Self::row_to_provider(row)
    }

    async fn list_providers(&self, reseller_id: Uuid) -> Result<Vec<PanelProvider>> {
        let rows = sqlx::query_as::<_, ProviderRow>(
            r#"
            SELECT id, reseller_id, family, name, base_url, api_key, database_url,
                   department, keywords, enabled, auto_renew
            FROM panel_providers
            WHERE reseller_id = ?
            ORDER BY created_at ASC
            "#
        )
        .bind(reseller_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_provider)
            .collect()
    }
}
