use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use crate::{
    domain::{Customer, CustomerStatus},
    error::Result,
    repository::CustomerRepository,
};

/// Variants shorter than this would match unrelated numbers by substring.
const MIN_VARIANT_LEN: usize = 8;

/// Finds every customer a payer phone could belong to.
pub struct CustomerMatcher {
    repo: Arc<dyn CustomerRepository>,
}

impl CustomerMatcher {
    pub fn new(repo: Arc<dyn CustomerRepository>) -> Self {
        Self { repo }
    }

    /// All customers whose stored phone contains any of `variants`, best
    /// match first. The first entry is the primary customer.
    pub async fn find(&self, variants: &BTreeSet<String>) -> Result<Vec<Customer>> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for variant in variants.iter().filter(|v| v.len() >= MIN_VARIANT_LEN) {
            for customer in self.repo.search_by_phone(variant).await? {
                if seen.insert(customer.id) {
                    candidates.push(customer);
                }
            }
        }

        rank(&mut candidates);
        tracing::debug!(
            variants = variants.len(),
            matches = candidates.len(),
            "Customer phone search finished"
        );
        Ok(candidates)
    }
}

/// How complete a customer record is for renewal purposes.
pub fn score(customer: &Customer) -> u8 {
    let mut score = 0;
    if customer.has_username() {
        score += 2;
    }
    if customer.server_id.is_some() {
        score += 2;
    }
    if customer.plan_id.is_some() {
        score += 1;
    }
    if customer.status == CustomerStatus::Active {
        score += 1;
    }
    score
}

/// Highest score first, newest record breaking ties.
pub fn rank(customers: &mut [Customer]) {
    customers.sort_by(|a, b| {
        score(b)
            .cmp(&score(a))
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn customer(username: Option<&str>, server: bool, plan: bool, status: CustomerStatus, age_days: i64) -> Customer {
        let created_at = Utc::now() - Duration::days(age_days);
        Customer {
            id: Uuid::new_v4(),
            reseller_id: Uuid::nil(),
            name: "test".to_string(),
            phone: "11987654321".to_string(),
            username: username.map(str::to_string),
            server_id: server.then(Uuid::new_v4),
            plan_id: plan.then(Uuid::new_v4),
            custom_price_cents: None,
            screens: 1,
            due_date: None,
            status,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_score() {
        assert_eq!(score(&customer(Some("a"), true, true, CustomerStatus::Active, 0)), 6);
        assert_eq!(score(&customer(Some(" , "), false, false, CustomerStatus::Inactive, 0)), 0);
        assert_eq!(score(&customer(None, true, false, CustomerStatus::Suspended, 0)), 2);
    }

    #[test]
    fn test_rank_prefers_complete_then_newest() {
        let bare = customer(None, false, false, CustomerStatus::Active, 0);
        let old_full = customer(Some("a"), true, true, CustomerStatus::Active, 30);
        let new_full = customer(Some("b"), true, true, CustomerStatus::Active, 1);
        let mut customers = vec![bare.clone(), old_full.clone(), new_full.clone()];

        rank(&mut customers);

        let order: Vec<Uuid> = customers.iter().map(|c| c.id).collect();
        assert_eq!(order, vec![new_full.id, old_full.id, bare.id]);
    }
}
