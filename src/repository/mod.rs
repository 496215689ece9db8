use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::domain::*;
use crate::error::Result;

pub mod customer_repository;
pub mod payment_repository;
pub mod plan_repository;
pub mod renewal_repository;
pub mod reseller_repository;
pub mod server_repository;

pub use customer_repository::SqliteCustomerRepository;
pub use payment_repository::SqlitePaymentRepository;
pub use plan_repository::SqlitePlanRepository;
pub use renewal_repository::SqliteRenewalRepository;
pub use reseller_repository::SqliteResellerRepository;
pub use server_repository::SqliteServerRepository;

#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn create(&self, customer: CreateCustomerRequest) -> Result<Customer>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Customer>>;
    /// Customers whose stored phone, stripped of formatting, contains `digits`.
    async fn search_by_phone(&self, digits: &str) -> Result<Vec<Customer>>;
}

#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn create(&self, plan: CreatePlanRequest) -> Result<Plan>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Plan>>;
    /// The reseller's catalog, cheapest first.
    async fn list_by_reseller(&self, reseller_id: Uuid) -> Result<Vec<Plan>>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(&self, payment: Payment) -> Result<Payment>;
    async fn find_by_customer(&self, customer_id: Uuid) -> Result<Vec<Payment>>;
    async fn find_recent_confirmed(
        &self,
        customer_id: Uuid,
        method: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Payment>>;
    async fn find_by_external_id(&self, customer_id: Uuid, external_id: &str) -> Result<Option<Payment>>;
}

#[async_trait]
pub trait RenewalRepository: Send + Sync {
    /// Stores every customer's new due date and payment in one transaction.
    /// Either the whole batch lands or none of it does.
    async fn commit(&self, renewals: &[PendingRenewal]) -> Result<RenewalCommit>;
}

#[async_trait]
pub trait ResellerRepository: Send + Sync {
    async fn create(&self, reseller: CreateResellerRequest) -> Result<Reseller>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Reseller>>;
    async fn find_by_webhook_secret(&self, secret: &str) -> Result<Option<Reseller>>;
    /// Deducts `amount` only if the balance covers it. Returns whether it did.
    async fn debit_credits(&self, id: Uuid, amount: i64) -> Result<bool>;
    async fn credit_credits(&self, id: Uuid, amount: i64) -> Result<()>;
}

#[async_trait]
pub trait ServerRepository: Send + Sync {
    async fn create_server(&self, reseller_id: Uuid, name: &str, host: &str) -> Result<Server>;
    async fn find_server(&self, id: Uuid) -> Result<Option<Server>>;
    async fn create_provider(&self, provider: CreatePanelProviderRequest) -> Result<PanelProvider>;
    async fn list_providers(&self, reseller_id: Uuid) -> Result<Vec<PanelProvider>>;
}
