#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use autorenew::{
    config::Settings,
    domain::{
        CreateCustomerRequest, CreatePanelProviderRequest, CreatePlanRequest, CreateResellerRequest,
        Customer, CustomerStatus, PanelFamily, PanelProvider, Reseller,
    },
    error::{AppError, Result},
    panels::{Lookup, PanelConnector, PanelRecord, PanelSession, RenewalTerm},
    renewal::ledger::{CreditAccount, Ledger},
    repository::{CustomerRepository, PlanRepository, ResellerRepository, ServerRepository},
    service::ServiceContext,
};
use chrono::{NaiveDate, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

pub const GLOBAL_SECRET: &str = "global-secret";
pub const ADMIN_KEY: &str = "admin-key";

/// Behaviour of one fake panel, keyed by provider name.
#[derive(Clone, Default)]
pub struct FakePanel {
    pub usernames: HashSet<String>,
    pub fail_renewals: bool,
    pub requires_credits: bool,
    /// Panel-side balance offered as an external ledger.
    pub balance: Option<Arc<AtomicI64>>,
}

impl FakePanel {
    pub fn with_users(users: &[&str]) -> Self {
        Self {
            usernames: users.iter().map(|u| u.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[derive(Default)]
pub struct FakeConnector {
    pub panels: HashMap<String, FakePanel>,
    pub renewed: Arc<Mutex<Vec<String>>>,
    pub closed: Arc<AtomicI64>,
}

impl FakeConnector {
    pub fn new(panels: Vec<(&str, FakePanel)>) -> Arc<Self> {
        Arc::new(Self {
            panels: panels.into_iter().map(|(n, p)| (n.to_string(), p)).collect(),
            ..Default::default()
        })
    }

    pub fn renewed(&self) -> Vec<String> {
        let mut renewed = self.renewed.lock().unwrap().clone();
        renewed.sort();
        renewed
    }
}

#[async_trait]
impl PanelConnector for FakeConnector {
    async fn connect(&self, provider: &PanelProvider) -> Result<Box<dyn PanelSession>> {
        let panel = self
            .panels
            .get(&provider.name)
            .cloned()
            .ok_or_else(|| AppError::Integration(format!("{} unreachable", provider.name)))?;
        Ok(Box::new(FakeSession {
            name: provider.name.clone(),
            panel,
            renewed: self.renewed.clone(),
            closed: self.closed.clone(),
        }))
    }
}

struct FakeSession {
    name: String,
    panel: FakePanel,
    renewed: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicI64>,
}

#[async_trait]
impl PanelSession for FakeSession {
    fn panel(&self) -> &str {
        &self.name
    }

    fn requires_credits(&self) -> bool {
        self.panel.requires_credits
    }

    async fn resolve(&self, username: &str) -> Lookup<PanelRecord> {
        if self.panel.usernames.contains(username) {
            Lookup::Found(PanelRecord {
                id: format!("id-{}", username),
                username: username.to_string(),
                scope: "lines".to_string(),
                owner_id: Some("7".to_string()),
            })
        } else {
            Lookup::NotFound
        }
    }

    async fn renew(&self, record: &PanelRecord, term: &RenewalTerm) -> Result<String> {
        if self.panel.fail_renewals {
            return Err(AppError::External("panel rejected the renewal".to_string()));
        }
        self.renewed.lock().unwrap().push(record.username.clone());
        Ok(format!("renewed until {}", term.due_date))
    }

    async fn credit_account(&self, record: &PanelRecord) -> Result<Option<Arc<dyn CreditAccount>>> {
        Ok(self.panel.balance.clone().map(|balance| {
            Arc::new(FakeBalance {
                owner: record.owner_id.clone().unwrap_or_default(),
                balance,
            }) as Arc<dyn CreditAccount>
        }))
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeBalance {
    owner: String,
    balance: Arc<AtomicI64>,
}

#[async_trait]
impl CreditAccount for FakeBalance {
    fn ledger(&self) -> Ledger {
        Ledger::External {
            table: "reg_users".to_string(),
            column: "credits".to_string(),
            row_key: self.owner.clone(),
        }
    }

    async fn charge(&self, credits: i64) -> Result<bool> {
        let current = self.balance.load(Ordering::SeqCst);
        if current < credits {
            return Ok(false);
        }
        self.balance.store(current - credits, Ordering::SeqCst);
        Ok(true)
    }

    async fn refund(&self, credits: i64) -> Result<()> {
        self.balance.fetch_add(credits, Ordering::SeqCst);
        Ok(())
    }
}

pub fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.webhook.secret = Some(GLOBAL_SECRET.to_string());
    settings.admin.api_key = Some(ADMIN_KEY.to_string());
    settings.panels.timeout_secs = 2;
    settings
}

pub async fn pool() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

pub async fn context(connector: Arc<FakeConnector>) -> anyhow::Result<Arc<ServiceContext>> {
    let pool = pool().await?;
    Ok(Arc::new(ServiceContext::with_connector(pool, &settings(), connector)))
}

pub async fn reseller(ctx: &ServiceContext, credits: Option<i64>, secret: Option<&str>) -> anyhow::Result<Reseller> {
    Ok(ctx
        .reseller_repo
        .create(CreateResellerRequest {
            name: "Reseller".to_string(),
            is_admin: false,
            credits,
            webhook_secret: secret.map(str::to_string),
        })
        .await?)
}

pub async fn monthly_plan(ctx: &ServiceContext, reseller_id: Uuid) -> anyhow::Result<Uuid> {
    let plan = ctx
        .plan_repo
        .create(CreatePlanRequest {
            reseller_id,
            name: "Monthly".to_string(),
            price_cents: 3500,
            duration_days: 30,
        })
        .await?;
    ctx.plan_repo
        .create(CreatePlanRequest {
            reseller_id,
            name: "Quarterly".to_string(),
            price_cents: 9000,
            duration_days: 90,
        })
        .await?;
    Ok(plan.id)
}

/// A server named `server_name` handled by a provider called `provider_name`.
pub async fn panel(
    ctx: &ServiceContext,
    reseller_id: Uuid,
    family: PanelFamily,
    server_name: &str,
    provider_name: &str,
) -> anyhow::Result<Uuid> {
    let server = ctx
        .server_repo
        .create_server(reseller_id, server_name, "panel.test")
        .await?;
    ctx.server_repo
        .create_provider(CreatePanelProviderRequest {
            reseller_id,
            family,
            name: provider_name.to_string(),
            base_url: Some("http://panel.test".to_string()),
            api_key: Some("key".to_string()),
            database_url: None,
            department: None,
            keywords: Vec::new(),
            enabled: true,
            auto_renew: true,
        })
        .await?;
    Ok(server.id)
}

pub struct NewCustomer<'a> {
    pub phone: &'a str,
    pub username: Option<&'a str>,
    pub server_id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
}

pub async fn customer(ctx: &ServiceContext, reseller_id: Uuid, new: NewCustomer<'_>) -> anyhow::Result<Customer> {
    Ok(ctx
        .customer_repo
        .create(CreateCustomerRequest {
            reseller_id,
            name: format!("Customer {}", new.username.unwrap_or("-")),
            phone: new.phone.to_string(),
            username: new.username.map(str::to_string),
            server_id: new.server_id,
            plan_id: new.plan_id,
            custom_price_cents: None,
            screens: 1,
            due_date: new.due_date,
            status: CustomerStatus::Active,
        })
        .await?)
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
