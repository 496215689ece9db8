use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{
    config::WebhookConfig,
    domain::{Customer, RenewalResult, Reseller},
    error::{AppError, Result},
    renewal::{
        duplicate::{DeliveryCheck, DuplicateGuard},
        event::PaymentEvent,
        fanout::{provisioning_targets, split_amount, CustomerRenewal, FanOut, PaymentReceipt, RenewalFanOut},
        locks::KeyedLocks,
        matcher::CustomerMatcher,
        phone::phone_variants,
        plan_inference::{infer_plan, InferredPlan, PlanSource},
        provisioning::Provisioner,
    },
    repository::{CustomerRepository, PaymentRepository, PlanRepository, RenewalRepository, ResellerRepository},
};

const MANUAL_METHOD: &str = "manual";
const MANUAL_SOURCE: &str = "manual";
/// Longest term a manual renewal may grant.
pub const MAX_MANUAL_DURATION_DAYS: i64 = 3660;

/// What happened to one inbound payment notification.
#[derive(Debug)]
pub enum Reconciliation {
    /// Not an approval event.
    Ignored { status: Option<String> },
    /// Nobody on file has the payer's phone.
    NotFound { searched_variants: Vec<String> },
    /// A redelivery of an event that was already processed.
    Duplicate { customer_id: Uuid, payment_id: Uuid },
    Renewed(RenewalSummary),
}

#[derive(Debug, Clone, Serialize)]
pub struct RenewalSummary {
    pub message: String,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub new_due_date: Option<NaiveDate>,
    pub duration_days: i64,
    pub plan_name: String,
    pub pricing_unmatched: bool,
    pub payment_recorded: bool,
    /// Total paid, in currency units.
    pub payment_amount: f64,
    pub matched_customers: usize,
    pub server_renewals: Vec<RenewalResult>,
}

/// Body of a manual renewal.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManualRenewal {
    pub duration_days: Option<i64>,
    /// Amount received, in currency units.
    pub amount: Option<f64>,
    pub method: Option<String>,
}

/// Turns payment notifications into renewed customers and panel renewals.
pub struct ReconciliationService {
    customers: Arc<dyn CustomerRepository>,
    plans: Arc<dyn PlanRepository>,
    payments: Arc<dyn PaymentRepository>,
    resellers: Arc<dyn ResellerRepository>,
    /// Held from the duplicate check through the local commit.
    customer_locks: KeyedLocks<Uuid>,
    matcher: CustomerMatcher,
    guard: DuplicateGuard,
    fanout: RenewalFanOut,
    provisioner: Provisioner,
    webhook: WebhookConfig,
}

impl ReconciliationService {
    pub fn new(
        customers: Arc<dyn CustomerRepository>,
        plans: Arc<dyn PlanRepository>,
        payments: Arc<dyn PaymentRepository>,
        renewals: Arc<dyn RenewalRepository>,
        resellers: Arc<dyn ResellerRepository>,
        provisioner: Provisioner,
        webhook: WebhookConfig,
    ) -> Self {
        Self {
            matcher: CustomerMatcher::new(customers.clone()),
            guard: DuplicateGuard::new(payments.clone(), webhook.payment_method.clone(), webhook.duplicate_window_secs),
            fanout: RenewalFanOut::new(renewals),
            customer_locks: KeyedLocks::default(),
            customers,
            plans,
            payments,
            resellers,
            provisioner,
            webhook,
        }
    }

    /// Processes one webhook delivery. `header_secret` is the secret sent
    /// out of band, if any.
    pub async fn reconcile(&self, body: &Value, header_secret: Option<&str>) -> Result<Reconciliation> {
        let event = PaymentEvent::from_payload(body, header_secret);
        let scope = self.authorize(event.secret.as_deref()).await?;

        if !event.is_approved() {
            tracing::debug!(status = ?event.status, "Ignoring non-approval event");
            return Ok(Reconciliation::Ignored { status: event.status });
        }

        let phone = event.require_phone()?;
        let paid_cents = event.require_amount()?;
        let variants = phone_variants(phone);

        let mut matches = self.matcher.find(&variants).await?;
        if let Some(reseller) = &scope {
            matches.retain(|c| c.reseller_id == reseller.id);
        }
        let Some(primary) = matches.first().cloned() else {
            tracing::info!(phone = %phone, variants = ?variants, "No customer matches the payer phone");
            return Ok(Reconciliation::NotFound {
                searched_variants: variants.into_iter().collect(),
            });
        };
        matches.retain(|c| c.reseller_id == primary.reseller_id);

        let share_cents = split_amount(paid_cents, matches.len())
            .first()
            .copied()
            .unwrap_or(paid_cents);
        let check = DeliveryCheck {
            customer_id: primary.id,
            paid_cents,
            share_cents,
            external_id: event.transaction_id.as_deref(),
        };
        let serial = self.customer_locks.lock(&primary.id).await;
        if let Some(previous) = self.guard.previous_delivery(&check, Utc::now()).await? {
            tracing::info!(
                customer_id = %primary.id,
                payment_id = %previous.id,
                transaction_id = ?event.transaction_id,
                "Duplicate delivery, nothing to do"
            );
            return Ok(Reconciliation::Duplicate {
                customer_id: primary.id,
                payment_id: previous.id,
            });
        }

        let reseller = self.owner_of(&primary).await?;
        let inferred = self.infer(&primary, paid_cents).await?;
        let receipt = PaymentReceipt {
            method: self.webhook.payment_method.clone(),
            external_id: event.transaction_id.clone(),
            source: Some(self.webhook.source.clone()),
        };

        tracing::info!(
            customer_id = %primary.id,
            matched = matches.len(),
            paid_cents,
            duration_days = inferred.duration_days,
            plan = %inferred.plan_name,
            "Reconciling payment"
        );
        // due dates may have moved while waiting for the lock
        let matches = self.refreshed(&matches).await?;
        let today = Utc::now().date_naive();
        let renewals = match self
            .fanout
            .apply(&matches, paid_cents, inferred.duration_days, today, &receipt)
            .await?
        {
            FanOut::Renewed(renewals) => renewals,
            FanOut::AlreadyRecorded { customer_id, external_id } => {
                return self.already_recorded(customer_id, &external_id).await;
            }
        };
        drop(serial);

        let summary = self.provision(&reseller, renewals, paid_cents, inferred).await?;
        Ok(Reconciliation::Renewed(summary))
    }

    /// Renews one customer by hand. Skips matching and the duplicate guard.
    pub async fn renew_customer(&self, customer_id: Uuid, request: ManualRenewal) -> Result<RenewalSummary> {
        let serial = self.customer_locks.lock(&customer_id).await;
        let customer = self
            .customers
            .find_by_id(customer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Customer {} not found", customer_id)))?;

        if request.duration_days.is_some_and(|d| d <= 0) {
            return Err(AppError::BadRequest("duration_days must be positive".to_string()));
        }
        if request.duration_days.is_some_and(|d| d > MAX_MANUAL_DURATION_DAYS) {
            return Err(AppError::BadRequest(format!(
                "duration_days must not exceed {}",
                MAX_MANUAL_DURATION_DAYS
            )));
        }
        let amount_cents = match request.amount {
            Some(amount) if amount < 0.0 => {
                return Err(AppError::BadRequest("amount must not be negative".to_string()))
            }
            Some(amount) => Some((amount * 100.0).round() as i64),
            None => None,
        };

        let reseller = self.owner_of(&customer).await?;
        let assigned = match customer.plan_id {
            Some(plan_id) => self.plans.find_by_id(plan_id).await?,
            None => None,
        };
        let paid_cents = amount_cents
            .or(customer.custom_price_cents)
            .or(assigned.as_ref().map(|p| p.price_cents))
            .unwrap_or(0);

        let inferred = match request.duration_days {
            Some(duration_days) => InferredPlan {
                duration_days,
                plan_name: assigned
                    .as_ref()
                    .map_or_else(|| format!("{} days", duration_days), |p| p.name.clone()),
                source: PlanSource::AssignedPlan,
            },
            None => self.infer(&customer, paid_cents).await?,
        };

        let receipt = PaymentReceipt {
            method: request.method.unwrap_or_else(|| MANUAL_METHOD.to_string()),
            external_id: None,
            source: Some(MANUAL_SOURCE.to_string()),
        };

        tracing::info!(customer_id = %customer.id, duration_days = inferred.duration_days, "Manual renewal");
        let today = Utc::now().date_naive();
        let renewals = match self
            .fanout
            .apply(std::slice::from_ref(&customer), paid_cents, inferred.duration_days, today, &receipt)
            .await?
        {
            FanOut::Renewed(renewals) => renewals,
            FanOut::AlreadyRecorded { external_id, .. } => {
                return Err(AppError::Internal(format!(
                    "manual renewal collided with transaction {}",
                    external_id
                )));
            }
        };
        drop(serial);

        self.provision(&reseller, renewals, paid_cents, inferred).await
    }

    /// The reseller a secret belongs to. `None` means the global secret
    /// matched and every reseller's customers are eligible.
    async fn authorize(&self, secret: Option<&str>) -> Result<Option<Reseller>> {
        let secret = secret.ok_or(AppError::Unauthorized)?;

        if let Some(global) = self.webhook.secret.as_deref().filter(|s| !s.is_empty()) {
            if bool::from(global.as_bytes().ct_eq(secret.as_bytes())) {
                return Ok(None);
            }
        }

        match self.resellers.find_by_webhook_secret(secret).await? {
            Some(reseller) => Ok(Some(reseller)),
            None => {
                tracing::warn!("Webhook delivery with an unknown secret");
                Err(AppError::Unauthorized)
            }
        }
    }

    async fn owner_of(&self, customer: &Customer) -> Result<Reseller> {
        self.resellers
            .find_by_id(customer.reseller_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Reseller {} of customer {} is missing", customer.reseller_id, customer.id)))
    }

    async fn infer(&self, customer: &Customer, paid_cents: i64) -> Result<InferredPlan> {
        let catalog = self.plans.list_by_reseller(customer.reseller_id).await?;
        let assigned = customer
            .plan_id
            .and_then(|id| catalog.iter().find(|p| p.id == id).cloned());
        let assigned = match (assigned, customer.plan_id) {
            (Some(plan), _) => Some(plan),
            (None, Some(id)) => self.plans.find_by_id(id).await?,
            (None, None) => None,
        };

        let inferred = infer_plan(customer, paid_cents, &catalog, assigned.as_ref());
        if inferred.source == PlanSource::Unmatched {
            tracing::warn!(
                customer_id = %customer.id,
                paid_cents,
                screens = customer.screens,
                "Unmatched pricing: no plan explains the amount, applying the default duration"
            );
        }
        Ok(inferred)
    }

    async fn refreshed(&self, customers: &[Customer]) -> Result<Vec<Customer>> {
        let mut fresh = Vec::with_capacity(customers.len());
        for customer in customers {
            if let Some(current) = self.customers.find_by_id(customer.id).await? {
                fresh.push(current);
            }
        }
        Ok(fresh)
    }

    /// Answers a delivery whose transaction the store already holds.
    async fn already_recorded(&self, customer_id: Uuid, external_id: &str) -> Result<Reconciliation> {
        let payment = self
            .payments
            .find_by_external_id(customer_id, external_id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "transaction {} reported as recorded for customer {} but not found",
                    external_id, customer_id
                ))
            })?;

        tracing::info!(
            customer_id = %customer_id,
            payment_id = %payment.id,
            transaction_id = %external_id,
            "Duplicate delivery caught at commit, nothing to do"
        );
        Ok(Reconciliation::Duplicate {
            customer_id,
            payment_id: payment.id,
        })
    }

    /// Renews the committed customers' logins on their panels and reports
    /// the outcome.
    async fn provision(
        &self,
        reseller: &Reseller,
        renewals: Vec<CustomerRenewal>,
        paid_cents: i64,
        inferred: InferredPlan,
    ) -> Result<RenewalSummary> {
        let targets = provisioning_targets(&renewals);
        let server_renewals = self
            .provisioner
            .provision(reseller, targets, inferred.duration_days)
            .await;

        let failed = server_renewals.iter().filter(|r| !r.success).count();
        if failed > 0 {
            tracing::warn!(failed, total = server_renewals.len(), "Some panel renewals failed");
        }

        let primary = renewals
            .first()
            .map(|r| &r.customer)
            .ok_or_else(|| AppError::Internal("renewal committed no customers".to_string()))?;

        let message = match renewals.len() {
            1 => format!("Renewed {} until {}", primary.name, display_date(primary.due_date)),
            n => format!(
                "Renewed {} customers; {} until {}",
                n,
                primary.name,
                display_date(primary.due_date)
            ),
        };

        Ok(RenewalSummary {
            message,
            customer_id: primary.id,
            customer_name: primary.name.clone(),
            new_due_date: primary.due_date,
            duration_days: inferred.duration_days,
            plan_name: inferred.plan_name,
            pricing_unmatched: inferred.source == PlanSource::Unmatched,
            payment_recorded: !renewals.is_empty(),
            payment_amount: paid_cents as f64 / 100.0,
            matched_customers: renewals.len(),
            server_renewals,
        })
    }
}

fn display_date(date: Option<NaiveDate>) -> String {
    date.map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d").to_string())
}
