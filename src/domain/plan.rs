use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub reseller_id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub duration_days: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlanRequest {
    pub reseller_id: Uuid,
    pub name: String,
    pub price_cents: i64,
    pub duration_days: i64,
}
