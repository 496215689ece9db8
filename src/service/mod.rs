use std::sync::Arc;
use sqlx::SqlitePool;

use crate::{
    config::Settings,
    error::Result,
    panels::{HttpPanelConnector, PanelConnector},
    renewal::{ledger::CreditLedger, provisioning::Provisioner, ReconciliationService},
    repository::*,
};

pub struct ServiceContext {
    pub customer_repo: Arc<dyn CustomerRepository>,
    pub plan_repo: Arc<dyn PlanRepository>,
    pub payment_repo: Arc<dyn PaymentRepository>,
    pub renewal_repo: Arc<dyn RenewalRepository>,
    pub reseller_repo: Arc<dyn ResellerRepository>,
    pub server_repo: Arc<dyn ServerRepository>,
    pub credit_ledger: Arc<CreditLedger>,
    pub reconciliation: Arc<ReconciliationService>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    /// Wires the SQLite repositories to real panel connections.
    pub fn new(db_pool: SqlitePool, settings: &Settings) -> Result<Self> {
        let connector = Arc::new(HttpPanelConnector::new(&settings.panels)?);
        Ok(Self::with_connector(db_pool, settings, connector))
    }

    /// Same as [`ServiceContext::new`] with a caller-supplied panel connector.
    pub fn with_connector(db_pool: SqlitePool, settings: &Settings, connector: Arc<dyn PanelConnector>) -> Self {
        let customer_repo: Arc<dyn CustomerRepository> = Arc::new(SqliteCustomerRepository::new(db_pool.clone()));
        let plan_repo: Arc<dyn PlanRepository> = Arc::new(SqlitePlanRepository::new(db_pool.clone()));
        let payment_repo: Arc<dyn PaymentRepository> = Arc::new(SqlitePaymentRepository::new(db_pool.clone()));
        let renewal_repo: Arc<dyn RenewalRepository> = Arc::new(SqliteRenewalRepository::new(db_pool.clone()));
        let reseller_repo: Arc<dyn ResellerRepository> = Arc::new(SqliteResellerRepository::new(db_pool.clone()));
        let server_repo: Arc<dyn ServerRepository> = Arc::new(SqliteServerRepository::new(db_pool.clone()));

        let credit_ledger = Arc::new(CreditLedger::new(reseller_repo.clone()));
        let provisioner = Provisioner::new(
            server_repo.clone(),
            connector,
            credit_ledger.clone(),
            &settings.panels,
        );
        let reconciliation = Arc::new(ReconciliationService::new(
            customer_repo.clone(),
            plan_repo.clone(),
            payment_repo.clone(),
            renewal_repo.clone(),
            reseller_repo.clone(),
            provisioner,
            settings.webhook.clone(),
        ));

        Self {
            customer_repo,
            plan_repo,
            payment_repo,
            renewal_repo,
            reseller_repo,
            server_repo,
            credit_ledger,
            reconciliation,
            db_pool,
        }
    }
}
