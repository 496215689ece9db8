use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reseller {
    pub id: Uuid,
    pub name: String,
    /// Administrators are unmetered: renewals never consume their credits.
    pub is_admin: bool,
    pub credits: Option<i64>,
    #[serde(skip_serializing)]
    pub webhook_secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResellerRequest {
    pub name: String,
    pub is_admin: bool,
    pub credits: Option<i64>,
    pub webhook_secret: Option<String>,
}
