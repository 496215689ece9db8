use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
    domain::{Customer, CustomerStatus, Payment, PendingRenewal, RenewalCommit},
    error::Result,
    renewal::due_date::extend_due_date,
    repository::RenewalRepository,
};

/// How the payments written for a renewal are tagged.
#[derive(Debug, Clone)]
pub struct PaymentReceipt {
    pub method: String,
    pub external_id: Option<String>,
    pub source: Option<String>,
}

/// A customer after its renewal was committed.
#[derive(Debug, Clone)]
pub struct CustomerRenewal {
    pub customer: Customer,
    pub payment: Payment,
}

/// One login to renew on a panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningTarget {
    pub username: String,
    pub customer_id: Uuid,
    pub server_id: Option<Uuid>,
    pub due_date: NaiveDate,
}

/// Splits `total_cents` into `parts` shares that differ by at most a cent
/// and sum to the total. Leftover cents go to the first shares.
pub fn split_amount(total_cents: i64, parts: usize) -> Vec<i64> {
    if parts == 0 {
        return Vec::new();
    }
    let n = parts as i64;
    let base = total_cents.div_euclid(n);
    let remainder = total_cents.rem_euclid(n);
    (0..n).map(|i| base + i64::from(i < remainder)).collect()
}

/// Every login across the renewed customers, each once. A login shared by
/// two customers is renewed with the first customer's server and due date.
pub fn provisioning_targets(renewals: &[CustomerRenewal]) -> Vec<ProvisioningTarget> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for renewal in renewals {
        let customer = &renewal.customer;
        let Some(due_date) = customer.due_date else {
            continue;
        };
        for username in customer.usernames() {
            if !seen.insert(username.to_lowercase()) {
                tracing::debug!(username = %username, customer_id = %customer.id, "Login already queued");
                continue;
            }
            targets.push(ProvisioningTarget {
                username,
                customer_id: customer.id,
                server_id: customer.server_id,
                due_date,
            });
        }
    }

    targets
}

/// What the local commit did with a batch.
#[derive(Debug)]
pub enum FanOut {
    Renewed(Vec<CustomerRenewal>),
    /// A matched customer already holds a payment for this transaction, so
    /// nothing was written.
    AlreadyRecorded { customer_id: Uuid, external_id: String },
}

/// Commits a renewal locally for every matched customer.
pub struct RenewalFanOut {
    renewals: Arc<dyn RenewalRepository>,
}

impl RenewalFanOut {
    pub fn new(renewals: Arc<dyn RenewalRepository>) -> Self {
        Self { renewals }
    }

    /// Extends each customer from its own due date, marks it active and
    /// records its share of the payment, all in one transaction.
    pub async fn apply(
        &self,
        customers: &[Customer],
        paid_cents: i64,
        duration_days: i64,
        today: NaiveDate,
        receipt: &PaymentReceipt,
    ) -> Result<FanOut> {
        let shares = split_amount(paid_cents, customers.len());
        let pending: Vec<PendingRenewal> = customers
            .iter()
            .zip(shares)
            .map(|(customer, share)| PendingRenewal {
                customer_id: customer.id,
                due_date: extend_due_date(customer.due_date, today, duration_days),
                payment: Payment::confirmed(
                    customer.id,
                    share,
                    receipt.method.clone(),
                    receipt.external_id.clone(),
                    receipt.source.clone(),
                ),
            })
            .collect();

        if let RenewalCommit::AlreadyRecorded { customer_id, external_id } = self.renewals.commit(&pending).await? {
            return Ok(FanOut::AlreadyRecorded { customer_id, external_id });
        }

        let renewals = customers
            .iter()
            .zip(pending)
            .map(|(customer, pending)| {
                tracing::info!(
                    customer_id = %customer.id,
                    previous_due = ?customer.due_date,
                    new_due = %pending.due_date,
                    amount_cents = pending.payment.amount_cents,
                    "Customer renewed"
                );
                let mut customer = customer.clone();
                customer.due_date = Some(pending.due_date);
                customer.status = CustomerStatus::Active;
                customer.updated_at = pending.payment.payment_date;
                CustomerRenewal {
                    customer,
                    payment: pending.payment,
                }
            })
            .collect();

        Ok(FanOut::Renewed(renewals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_split_sums_to_total() {
        assert_eq!(split_amount(10000, 3), vec![3334, 3333, 3333]);
        assert_eq!(split_amount(7000, 2), vec![3500, 3500]);
        assert_eq!(split_amount(1, 3), vec![1, 0, 0]);
        assert!(split_amount(100, 0).is_empty());
        assert_eq!(split_amount(9999, 7).iter().sum::<i64>(), 9999);
    }

    fn renewal(username: Option<&str>, server: Option<Uuid>) -> CustomerRenewal {
        let customer = Customer {
            id: Uuid::new_v4(),
            reseller_id: Uuid::nil(),
            name: "c".to_string(),
            phone: "11987654321".to_string(),
            username: username.map(str::to_string),
            server_id: server,
            plan_id: None,
            custom_price_cents: None,
            screens: 1,
            due_date: NaiveDate::from_ymd_opt(2024, 5, 1),
            status: CustomerStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let payment = Payment::confirmed(customer.id, 100, "instant_transfer", None, None);
        CustomerRenewal { customer, payment }
    }

    #[test]
    fn test_targets_are_deduplicated_first_owner_wins() {
        let server_a = Uuid::new_v4();
        let server_b = Uuid::new_v4();
        let renewals = vec![
            renewal(Some("ana1, ana2"), Some(server_a)),
            renewal(Some("ana2,bruno"), Some(server_b)),
            renewal(None, Some(server_b)),
            renewal(Some(" , "), None),
        ];

        let targets = provisioning_targets(&renewals);
        let names: Vec<_> = targets.iter().map(|t| t.username.as_str()).collect();
        assert_eq!(names, vec!["ana1", "ana2", "bruno"]);
        assert_eq!(targets[1].server_id, Some(server_a));
        assert_eq!(targets[1].customer_id, renewals[0].customer.id);
        assert_eq!(targets[2].server_id, Some(server_b));
    }
}
