use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: Uuid,
    pub reseller_id: Uuid,
    pub name: String,
    pub phone: String,
    /// One provisioning login per screen, comma separated.
    pub username: Option<String>,
    pub server_id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub custom_price_cents: Option<i64>,
    pub screens: i64,
    pub due_date: Option<NaiveDate>,
    pub status: CustomerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Individual provisioning logins held by this customer, trimmed and
    /// without empty entries.
    pub fn usernames(&self) -> Vec<String> {
        self.username
            .as_deref()
            .map(split_usernames)
            .unwrap_or_default()
    }

    pub fn has_username(&self) -> bool {
        !self.usernames().is_empty()
    }
}

pub fn split_usernames(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CustomerStatus {
    Active,
    Inactive,
    Suspended,
}

impl CustomerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerStatus::Active => "active",
            CustomerStatus::Inactive => "inactive",
            CustomerStatus::Suspended => "suspended",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(CustomerStatus::Active),
            "inactive" => Some(CustomerStatus::Inactive),
            "suspended" => Some(CustomerStatus::Suspended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    pub reseller_id: Uuid,
    pub name: String,
    pub phone: String,
    pub username: Option<String>,
    pub server_id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub custom_price_cents: Option<i64>,
    pub screens: i64,
    pub due_date: Option<NaiveDate>,
    pub status: CustomerStatus,
}
