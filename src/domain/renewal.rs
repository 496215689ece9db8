use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Payment;

/// Outcome of renewing one provisioning login on one panel. Reported in the
/// webhook response and logged; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RenewalResult {
    pub panel: String,
    pub username: String,
    pub success: bool,
    pub result: String,
}

impl RenewalResult {
    pub fn ok(panel: impl Into<String>, username: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            panel: panel.into(),
            username: username.into(),
            success: true,
            result: detail.into(),
        }
    }

    pub fn failed(panel: impl Into<String>, username: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            panel: panel.into(),
            username: username.into(),
            success: false,
            result: detail.into(),
        }
    }
}

/// A customer's new due date and the payment covering it, before either is
/// stored.
#[derive(Debug, Clone)]
pub struct PendingRenewal {
    pub customer_id: Uuid,
    pub due_date: NaiveDate,
    pub payment: Payment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewalCommit {
    Committed,
    /// The customer already has a payment for this provider transaction.
    /// Nothing from the batch was written.
    AlreadyRecorded { customer_id: Uuid, external_id: String },
}
