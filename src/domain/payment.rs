use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub amount_cents: i64,
    pub method: String,
    pub confirmed: bool,
    pub payment_date: DateTime<Utc>,
    /// Transaction id assigned by the payment provider.
    pub external_id: Option<String>,
    pub source: Option<String>,
}

impl Payment {
    pub fn confirmed(
        customer_id: Uuid,
        amount_cents: i64,
        method: impl Into<String>,
        external_id: Option<String>,
        source: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            amount_cents,
            method: method.into(),
            confirmed: true,
            payment_date: Utc::now(),
            external_id,
            source,
        }
    }
}
