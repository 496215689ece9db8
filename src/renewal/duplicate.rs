use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{domain::Payment, error::Result, repository::PaymentRepository};

/// Amounts this close are the same payment.
const AMOUNT_TOLERANCE_CENTS: i64 = 1;

/// Detects redelivered webhook events.
///
/// Providers deliver at least once, so a retry has to be recognised from
/// what was already recorded: a payment carrying the same transaction id, or
/// a confirmed payment of the same amount in the last couple of minutes.
pub struct DuplicateGuard {
    payments: Arc<dyn PaymentRepository>,
    method: String,
    window: Duration,
}

#[derive(Debug, Clone)]
pub struct DeliveryCheck<'a> {
    pub customer_id: Uuid,
    pub paid_cents: i64,
    /// The customer's share when the payment is split across several records.
    pub share_cents: i64,
    pub external_id: Option<&'a str>,
}

impl DuplicateGuard {
    pub fn new(payments: Arc<dyn PaymentRepository>, method: impl Into<String>, window_secs: i64) -> Self {
        Self {
            payments,
            method: method.into(),
            window: Duration::seconds(window_secs),
        }
    }

    /// Returns the already-recorded payment this delivery repeats, if any.
    pub async fn previous_delivery(&self, check: &DeliveryCheck<'_>, now: DateTime<Utc>) -> Result<Option<Payment>> {
        if let Some(external_id) = check.external_id.filter(|id| !id.is_empty()) {
            if let Some(payment) = self
                .payments
                .find_by_external_id(check.customer_id, external_id)
                .await?
            {
                return Ok(Some(payment));
            }
        }

        let recent = self
            .payments
            .find_recent_confirmed(check.customer_id, &self.method, now - self.window)
            .await?;

        Ok(recent.into_iter().find(|p| {
            amounts_match(p.amount_cents, check.paid_cents)
                || amounts_match(p.amount_cents, check.share_cents)
        }))
    }
}

fn amounts_match(a: i64, b: i64) -> bool {
    (a - b).abs() <= AMOUNT_TOLERANCE_CENTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_tolerance() {
        assert!(amounts_match(7000, 7000));
        assert!(amounts_match(7000, 7001));
        assert!(amounts_match(7000, 6999));
        assert!(!amounts_match(7000, 7002));
    }
}
