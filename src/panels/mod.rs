//! Provisioning panel adapters.
//!
//! Every vendor family reaches its panel differently, but each one is opened
//! once per invocation as a [`PanelSession`], asked to resolve usernames to
//! its own record ids, asked to renew them, and closed again.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::{LegacyApiConfig, PanelsConfig},
    domain::{PanelFamily, PanelProvider, Server},
    error::{AppError, Result},
    renewal::ledger::CreditAccount,
};

pub mod activation;
pub mod api;
pub mod database;
#[cfg(test)]
mod stub;

/// Outcome of looking a username up on a panel.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    /// Definitely absent from every place the adapter searched.
    NotFound,
    /// The panel couldn't answer; the username may still exist.
    Transient(String),
}

/// A panel-side record a username resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelRecord {
    pub id: String,
    pub username: String,
    /// Where the record lives: resource kind or table name.
    pub scope: String,
    /// The panel's own id for the reseller account owning the record.
    pub owner_id: Option<String>,
}

/// What a single login is being renewed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalTerm {
    pub duration_days: i64,
    /// Whole months, also the number of credits the renewal costs.
    pub months: i64,
    pub due_date: NaiveDate,
}

/// A request-scoped connection to one provider. Any state a vendor needs
/// across calls (working auth header, department id, database pool) lives on
/// the session, never in globals.
#[async_trait]
pub trait PanelSession: Send + Sync {
    /// Provider name as reported in renewal results.
    fn panel(&self) -> &str;

    /// Whether renewals on this panel consume reseller credits.
    fn requires_credits(&self) -> bool {
        false
    }

    async fn resolve(&self, username: &str) -> Lookup<PanelRecord>;

    /// Renews a resolved record, returning a short description of what the
    /// panel did.
    async fn renew(&self, record: &PanelRecord, term: &RenewalTerm) -> Result<String>;

    /// The panel-side balance of the reseller owning `record`, for panels
    /// that keep their own credit ledger.
    async fn credit_account(&self, _record: &PanelRecord) -> Result<Option<Arc<dyn CreditAccount>>> {
        Ok(None)
    }

    /// Releases whatever the session holds. Called on every exit path.
    async fn close(&self) {}
}

#[async_trait]
pub trait PanelConnector: Send + Sync {
    async fn connect(&self, provider: &PanelProvider) -> Result<Box<dyn PanelSession>>;
}

/// Opens real sessions over HTTP or MySQL.
pub struct HttpPanelConnector {
    http: reqwest::Client,
    timeout: Duration,
}

impl HttpPanelConnector {
    pub fn new(config: &PanelsConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("autorenew/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client: {}", e)))?;
        Ok(Self { http, timeout })
    }
}

#[async_trait]
impl PanelConnector for HttpPanelConnector {
    async fn connect(&self, provider: &PanelProvider) -> Result<Box<dyn PanelSession>> {
        tracing::debug!(
            provider = %provider.name,
            family = provider.family.as_str(),
            "Opening panel session"
        );
        match provider.family {
            PanelFamily::Api => Ok(Box::new(api::ApiSession::new(provider, self.http.clone())?)),
            PanelFamily::Database => Ok(Box::new(
                database::DatabaseSession::connect(provider, self.timeout).await?,
            )),
            PanelFamily::Activation => Ok(Box::new(
                activation::ActivationSession::connect(provider, self.http.clone()).await?,
            )),
        }
    }
}

/// The provider responsible for `server`: the first enabled, auto-renewing
/// provider whose vendor keywords appear in the server's name or host, or
/// the configured legacy API panel.
pub fn provider_for_server(
    server: &Server,
    providers: &[PanelProvider],
    legacy: Option<&LegacyApiConfig>,
) -> Option<PanelProvider> {
    if let Some(provider) = providers
        .iter()
        .find(|p| p.enabled && p.auto_renew && p.handles(server))
    {
        return Some(provider.clone());
    }

    let has_own_api = providers
        .iter()
        .any(|p| p.family == PanelFamily::Api && p.enabled && p.auto_renew);
    if has_own_api {
        return None;
    }

    let legacy = legacy?;
    let provider = PanelProvider {
        id: uuid::Uuid::nil(),
        reseller_id: server.reseller_id,
        family: PanelFamily::Api,
        name: "legacy-api".to_string(),
        base_url: Some(legacy.base_url.clone()),
        api_key: Some(legacy.api_key.clone()),
        database_url: None,
        department: None,
        keywords: legacy.keywords.clone(),
        enabled: true,
        auto_renew: true,
    };
    provider.handles(server).then_some(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn server(name: &str, host: &str) -> Server {
        Server {
            id: Uuid::new_v4(),
            reseller_id: Uuid::nil(),
            name: name.to_string(),
            host: host.to_string(),
            created_at: Utc::now(),
        }
    }

    fn provider(family: PanelFamily, keywords: &[&str], enabled: bool, auto_renew: bool) -> PanelProvider {
        PanelProvider {
            id: Uuid::new_v4(),
            reseller_id: Uuid::nil(),
            family,
            name: format!("{}-panel", family.as_str()),
            base_url: Some("http://panel.test".to_string()),
            api_key: Some("key".to_string()),
            database_url: None,
            department: None,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            enabled,
            auto_renew,
        }
    }

    #[test]
    fn test_matches_by_name_or_host() {
        let providers = vec![
            provider(PanelFamily::Api, &[], true, true),
            provider(PanelFamily::Database, &["megatv"], true, true),
        ];

        let by_name = provider_for_server(&server("Sigma Main", ""), &providers, None);
        assert_eq!(by_name.map(|p| p.family), Some(PanelFamily::Api));

        let by_host = provider_for_server(&server("Backup", "panel.megatv.net"), &providers, None);
        assert_eq!(by_host.map(|p| p.family), Some(PanelFamily::Database));

        assert!(provider_for_server(&server("Unknown", "example.org"), &providers, None).is_none());
    }

    #[test]
    fn test_disabled_or_manual_providers_are_skipped() {
        let providers = vec![
            provider(PanelFamily::Database, &["xui"], false, true),
            provider(PanelFamily::Database, &["xui"], true, false),
        ];
        assert!(provider_for_server(&server("XUI One", ""), &providers, None).is_none());
    }

    #[test]
    fn test_legacy_fallback() {
        let legacy = LegacyApiConfig {
            base_url: "http://legacy.test".to_string(),
            api_key: "k".to_string(),
            keywords: vec!["sigma".to_string()],
        };
        let found = provider_for_server(&server("sigma", ""), &[], Some(&legacy));
        assert_eq!(found.map(|p| p.name), Some("legacy-api".to_string()));

        let own = vec![provider(PanelFamily::Api, &["other"], true, true)];
        assert!(provider_for_server(&server("sigma", ""), &own, Some(&legacy)).is_none());
    }
}
