use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tokio::sync::Mutex;

use crate::{
    domain::PanelProvider,
    error::{AppError, Result},
    panels::{Lookup, PanelRecord, PanelSession, RenewalTerm},
    renewal::ledger::{CreditAccount, Ledger},
};

/// Tables subscriber lines may live in, depending on the panel release.
const LINE_TABLES: &[&str] = &["lines", "users"];
const IDENTIFIER_COLUMNS: &[&str] = &["username", "login", "user"];
const EXPIRY_COLUMNS: &[&str] = &["exp_date", "expires_at", "expiration", "expire_date"];
const OWNER_COLUMNS: &[&str] = &["member_id", "reseller_id", "owner_id", "created_by"];
/// Tables holding the panel's reseller accounts.
const OWNER_TABLES: &[&str] = &["reg_users", "resellers", "members"];
const BALANCE_COLUMNS: &[&str] = &["credits", "credit", "balance", "wallet", "money", "saldo"];

/// How a panel stores expiry, read off the column's SQL type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryFormat {
    UnixEpoch,
    Date,
    DateTime,
}

impl ExpiryFormat {
    pub fn from_sql_type(data_type: &str) -> Self {
        match data_type.to_lowercase().as_str() {
            "int" | "integer" | "bigint" | "mediumint" | "smallint" | "tinyint" | "decimal" => {
                ExpiryFormat::UnixEpoch
            }
            "date" => ExpiryFormat::Date,
            _ => ExpiryFormat::DateTime,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryValue {
    Epoch(i64),
    Text(String),
}

/// The value written for a line expiring at the end of `due_date` (UTC).
pub fn expiry_value(format: ExpiryFormat, due_date: NaiveDate) -> ExpiryValue {
    let end_of_day = due_date
        .and_hms_opt(23, 59, 59)
        .unwrap_or_else(|| due_date.and_time(chrono::NaiveTime::MIN));
    match format {
        ExpiryFormat::UnixEpoch => ExpiryValue::Epoch(end_of_day.and_utc().timestamp()),
        ExpiryFormat::Date => ExpiryValue::Text(due_date.format("%Y-%m-%d").to_string()),
        ExpiryFormat::DateTime => ExpiryValue::Text(end_of_day.format("%Y-%m-%d %H:%M:%S").to_string()),
    }
}

#[derive(Debug, Clone)]
struct TableSchema {
    /// Lowercased column name → SQL data type.
    columns: HashMap<String, String>,
}

impl TableSchema {
    fn has(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    fn first_of(&self, candidates: &[&'static str]) -> Option<&'static str> {
        candidates.iter().copied().find(|c| self.has(c))
    }
}

/// Session holding a short-lived pool into a panel's own MySQL database.
///
/// Table and column names only ever come from the candidate lists above,
/// so interpolating them into SQL is safe.
pub struct DatabaseSession {
    name: String,
    pool: MySqlPool,
    timeout: Duration,
    schemas: Mutex<HashMap<&'static str, Option<TableSchema>>>,
}

impl DatabaseSession {
    pub async fn connect(provider: &PanelProvider, timeout: Duration) -> Result<Self> {
        let url = provider
            .database_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                AppError::Integration(format!("{}: database URL not configured", provider.name))
            })?;

        let pool = bounded(
            timeout,
            MySqlPoolOptions::new()
                .max_connections(2)
                .acquire_timeout(timeout)
                .connect(url),
        )
        .await?;

        Ok(Self {
            name: provider.name.clone(),
            pool,
            timeout,
            schemas: Mutex::new(HashMap::new()),
        })
    }

    async fn schema(&self, table: &'static str) -> Result<Option<TableSchema>> {
        let mut schemas = self.schemas.lock().await;
        if let Some(cached) = schemas.get(table) {
            return Ok(cached.clone());
        }

        let rows: Vec<(String, String)> = bounded(
            self.timeout,
            sqlx::query_as(
                r#"
                SELECT CAST(COLUMN_NAME AS CHAR), CAST(DATA_TYPE AS CHAR)
                FROM information_schema.COLUMNS
                WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
                "#,
            )
            .bind(table)
            .fetch_all(&self.pool),
        )
        .await?;

        let schema = (!rows.is_empty()).then(|| TableSchema {
            columns: rows
                .into_iter()
                .map(|(name, data_type)| (name.to_lowercase(), data_type))
                .collect(),
        });
        schemas.insert(table, schema.clone());
        Ok(schema)
    }

    async fn find_in_table(&self, table: &'static str, username: &str) -> Result<Option<PanelRecord>> {
        let Some(schema) = self.schema(table).await? else {
            return Ok(None);
        };
        if !schema.has("id") {
            return Ok(None);
        }
        let owner = schema
            .first_of(OWNER_COLUMNS)
            .map(|c| format!("CAST(`{}` AS CHAR)", c))
            .unwrap_or_else(|| "CAST(NULL AS CHAR)".to_string());

        for column in IDENTIFIER_COLUMNS.iter().filter(|c| schema.has(c)) {
            let query = format!(
                "SELECT CAST(`id` AS CHAR), {} FROM `{}` WHERE TRIM(`{}`) = ? LIMIT 1",
                owner, table, column
            );
            let row: Option<(String, Option<String>)> = bounded(
                self.timeout,
                sqlx::query_as(&query).bind(username.trim()).fetch_optional(&self.pool),
            )
            .await?;

            if let Some((id, owner_id)) = row {
                return Ok(Some(PanelRecord {
                    id,
                    username: username.trim().to_string(),
                    scope: table.to_string(),
                    owner_id: owner_id.filter(|o| !o.is_empty() && o != "0"),
                }));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl PanelSession for DatabaseSession {
    fn panel(&self) -> &str {
        &self.name
    }

    fn requires_credits(&self) -> bool {
        true
    }

    async fn resolve(&self, username: &str) -> Lookup<PanelRecord> {
        for &table in LINE_TABLES {
            match self.find_in_table(table, username).await {
                Ok(Some(record)) => return Lookup::Found(record),
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(panel = %self.name, table, username, error = %e, "Panel lookup failed");
                    return Lookup::Transient(e.to_string());
                }
            }
        }
        Lookup::NotFound
    }

    async fn renew(&self, record: &PanelRecord, term: &RenewalTerm) -> Result<String> {
        let table = LINE_TABLES
            .iter()
            .copied()
            .find(|t| *t == record.scope)
            .ok_or_else(|| AppError::Integration(format!("unknown line table {}", record.scope)))?;
        let schema = self
            .schema(table)
            .await?
            .ok_or_else(|| AppError::Integration(format!("table {} disappeared", table)))?;
        let expiry_column = schema
            .first_of(EXPIRY_COLUMNS)
            .ok_or_else(|| AppError::Integration(format!("no expiry column on {}", table)))?;
        let format = ExpiryFormat::from_sql_type(&schema.columns[expiry_column]);

        let reenable = if schema.has("enabled") { ", `enabled` = 1" } else { "" };
        let query = format!(
            "UPDATE `{}` SET `{}` = ?{} WHERE `id` = ?",
            table, expiry_column, reenable
        );
        let statement = match expiry_value(format, term.due_date) {
            ExpiryValue::Epoch(epoch) => sqlx::query(&query).bind(epoch),
            ExpiryValue::Text(text) => sqlx::query(&query).bind(text),
        };
        let updated = bounded(self.timeout, statement.bind(&record.id).execute(&self.pool)).await?;
        ensure_renewed(updated.rows_affected(), table, &record.id)?;

        Ok(format!("{}.{} set to {}", table, expiry_column, term.due_date))
    }

    async fn credit_account(&self, record: &PanelRecord) -> Result<Option<Arc<dyn CreditAccount>>> {
        let Some(owner_id) = record.owner_id.clone() else {
            return Ok(None);
        };

        for &table in OWNER_TABLES {
            let Some(schema) = self.schema(table).await? else {
                continue;
            };
            let Some(column) = schema.first_of(BALANCE_COLUMNS) else {
                continue;
            };
            if !schema.has("id") {
                continue;
            }

            let query = format!("SELECT COUNT(*) FROM `{}` WHERE `id` = ?", table);
            let (count,): (i64,) = bounded(
                self.timeout,
                sqlx::query_as(&query).bind(&owner_id).fetch_one(&self.pool),
            )
            .await?;
            if count == 0 {
                continue;
            }

            return Ok(Some(Arc::new(PanelCreditAccount {
                pool: self.pool.clone(),
                timeout: self.timeout,
                table,
                column,
                row_key: owner_id,
            })));
        }
        Ok(None)
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::debug!(panel = %self.name, "Panel database pool closed");
    }
}

/// A reseller balance column inside the panel's database.
pub struct PanelCreditAccount {
    pool: MySqlPool,
    timeout: Duration,
    table: &'static str,
    column: &'static str,
    row_key: String,
}

#[async_trait]
impl CreditAccount for PanelCreditAccount {
    fn ledger(&self) -> Ledger {
        Ledger::External {
            table: self.table.to_string(),
            column: self.column.to_string(),
            row_key: self.row_key.clone(),
        }
    }

    async fn charge(&self, credits: i64) -> Result<bool> {
        let query = format!(
            "UPDATE `{t}` SET `{c}` = `{c}` - ? WHERE `id` = ? AND `{c}` >= ?",
            t = self.table,
            c = self.column
        );
        let result = bounded(
            self.timeout,
            sqlx::query(&query)
                .bind(credits)
                .bind(&self.row_key)
                .bind(credits)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn refund(&self, credits: i64) -> Result<()> {
        let query = format!(
            "UPDATE `{t}` SET `{c}` = `{c}` + ? WHERE `id` = ?",
            t = self.table,
            c = self.column
        );
        bounded(
            self.timeout,
            sqlx::query(&query)
                .bind(credits)
                .bind(&self.row_key)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

/// An expiry UPDATE that matched no row means the line vanished after it
/// was resolved.
fn ensure_renewed(rows_affected: u64, table: &str, id: &str) -> Result<()> {
    if rows_affected == 0 {
        return Err(AppError::External(format!("{} row {} no longer exists", table, id)));
    }
    Ok(())
}

async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(|e| AppError::External(format!("panel database: {}", e))),
        Err(_) => Err(AppError::Timeout(format!(
            "panel database did not answer within {}s",
            timeout.as_secs()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_format_from_column_type() {
        assert_eq!(ExpiryFormat::from_sql_type("INT"), ExpiryFormat::UnixEpoch);
        assert_eq!(ExpiryFormat::from_sql_type("bigint"), ExpiryFormat::UnixEpoch);
        assert_eq!(ExpiryFormat::from_sql_type("date"), ExpiryFormat::Date);
        assert_eq!(ExpiryFormat::from_sql_type("datetime"), ExpiryFormat::DateTime);
        assert_eq!(ExpiryFormat::from_sql_type("varchar"), ExpiryFormat::DateTime);
    }

    #[test]
    fn test_expiry_values() {
        let due = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(expiry_value(ExpiryFormat::UnixEpoch, due), ExpiryValue::Epoch(1_709_251_199));
        assert_eq!(expiry_value(ExpiryFormat::Date, due), ExpiryValue::Text("2024-02-29".to_string()));
        assert_eq!(
            expiry_value(ExpiryFormat::DateTime, due),
            ExpiryValue::Text("2024-02-29 23:59:59".to_string())
        );
    }

    #[test]
    fn test_update_that_matched_nothing_fails() {
        assert!(ensure_renewed(1, "lines", "42").is_ok());
        match ensure_renewed(0, "lines", "42") {
            Err(AppError::External(msg)) => assert_eq!(msg, "lines row 42 no longer exists"),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
