use serde::Serialize;

use crate::domain::{Customer, Plan};

/// Used when nothing in the catalog explains the amount paid.
pub const DEFAULT_DURATION_DAYS: i64 = 30;

/// Which rule produced the inferred plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    PerScreenPrice,
    TotalPrice,
    CustomPrice,
    AssignedPlan,
    /// No rule matched; the default duration was applied. Usually a sign the
    /// catalog or the customer's pricing is misconfigured.
    Unmatched,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InferredPlan {
    pub duration_days: i64,
    pub plan_name: String,
    pub source: PlanSource,
}

impl InferredPlan {
    fn from_plan(plan: &Plan, source: PlanSource) -> Self {
        Self {
            duration_days: plan.duration_days,
            plan_name: plan.name.clone(),
            source,
        }
    }
}

/// Works out what was bought from the amount paid.
///
/// `catalog` is the reseller's plans; `assigned` is the customer's current
/// plan when it has one.
pub fn infer_plan(customer: &Customer, paid_cents: i64, catalog: &[Plan], assigned: Option<&Plan>) -> InferredPlan {
    let screens = customer.screens.max(1);
    let per_screen = paid_cents / screens;

    if let Some(plan) = closest_within_tolerance(catalog, per_screen) {
        return InferredPlan::from_plan(plan, PlanSource::PerScreenPrice);
    }

    if let Some(plan) = closest_within_tolerance(catalog, paid_cents) {
        return InferredPlan::from_plan(plan, PlanSource::TotalPrice);
    }

    if let (Some(custom), Some(plan)) = (customer.custom_price_cents, assigned) {
        if within_tolerance(paid_cents, custom) {
            return InferredPlan::from_plan(plan, PlanSource::CustomPrice);
        }
    }

    if let Some(plan) = assigned {
        return InferredPlan::from_plan(plan, PlanSource::AssignedPlan);
    }

    InferredPlan {
        duration_days: DEFAULT_DURATION_DAYS,
        plan_name: String::new(),
        source: PlanSource::Unmatched,
    }
}

/// The plan priced nearest to `target`, if it is within 10% of the plan's
/// own price. Ties go to the cheaper plan.
fn closest_within_tolerance(catalog: &[Plan], target: i64) -> Option<&Plan> {
    catalog
        .iter()
        .filter(|plan| plan.price_cents > 0 && within_tolerance(plan.price_cents, target))
        .min_by_key(|plan| ((plan.price_cents - target).abs(), plan.price_cents))
}

/// `|reference - value| <= 10% of reference`, in integer cents.
fn within_tolerance(reference: i64, value: i64) -> bool {
    (reference - value).abs() * 10 <= reference
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CustomerStatus;
    use chrono::Utc;
    use uuid::Uuid;

    fn plan(name: &str, price_cents: i64, duration_days: i64) -> Plan {
        Plan {
            id: Uuid::new_v4(),
            reseller_id: Uuid::nil(),
            name: name.to_string(),
            price_cents,
            duration_days,
            created_at: Utc::now(),
        }
    }

    fn catalog() -> Vec<Plan> {
        vec![
            plan("Monthly", 3500, 30),
            plan("Quarterly", 9000, 90),
            plan("Semester", 17500, 180),
            plan("Yearly", 30000, 365),
        ]
    }

    fn customer(screens: i64, custom_price_cents: Option<i64>) -> Customer {
        Customer {
            id: Uuid::new_v4(),
            reseller_id: Uuid::nil(),
            name: "test".to_string(),
            phone: String::new(),
            username: None,
            server_id: None,
            plan_id: None,
            custom_price_cents,
            screens,
            due_date: None,
            status: CustomerStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_two_screens_paying_double_monthly() {
        let inferred = infer_plan(&customer(2, None), 7000, &catalog(), None);
        assert_eq!(inferred.duration_days, 30);
        assert_eq!(inferred.plan_name, "Monthly");
        assert_eq!(inferred.source, PlanSource::PerScreenPrice);
    }

    #[test]
    fn test_per_screen_within_tolerance() {
        // 9500 is within 10% of 9000 but not of 17500
        let inferred = infer_plan(&customer(1, None), 9500, &catalog(), None);
        assert_eq!(inferred.plan_name, "Quarterly");
    }

    #[test]
    fn test_total_price_fallback() {
        // 5833 per screen matches nothing; the total matches the semester plan.
        let inferred = infer_plan(&customer(3, None), 17500, &catalog(), None);
        assert_eq!(inferred.plan_name, "Semester");
        assert_eq!(inferred.source, PlanSource::TotalPrice);
    }

    #[test]
    fn test_custom_price_uses_assigned_plan() {
        let assigned = plan("Custom monthly", 3500, 30);
        let inferred = infer_plan(&customer(1, Some(5000)), 5200, &catalog(), Some(&assigned));
        assert_eq!(inferred.duration_days, 30);
        assert_eq!(inferred.source, PlanSource::CustomPrice);
    }

    #[test]
    fn test_assigned_plan_then_unmatched() {
        let assigned = plan("Quarterly", 9000, 90);
        let inferred = infer_plan(&customer(1, None), 123, &catalog(), Some(&assigned));
        assert_eq!(inferred.duration_days, 90);
        assert_eq!(inferred.source, PlanSource::AssignedPlan);

        let inferred = infer_plan(&customer(1, None), 123, &catalog(), None);
        assert_eq!(inferred.duration_days, DEFAULT_DURATION_DAYS);
        assert_eq!(inferred.source, PlanSource::Unmatched);
        assert!(inferred.plan_name.is_empty());
    }

    #[test]
    fn test_tolerance_is_relative_to_plan_price() {
        assert!(within_tolerance(3500, 3850));
        assert!(!within_tolerance(3500, 3851));
        assert!(within_tolerance(3500, 3150));
    }
}
