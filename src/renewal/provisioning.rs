//! Pushes committed renewals out to the provisioning panels.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use uuid::Uuid;

use crate::{
    config::{LegacyApiConfig, PanelsConfig},
    domain::{PanelProvider, RenewalResult, Reseller},
    error::{AppError, Result},
    panels::{provider_for_server, Lookup, PanelConnector, PanelSession, RenewalTerm},
    renewal::{due_date::credits_for, fanout::ProvisioningTarget, ledger::CreditLedger},
    repository::ServerRepository,
};

pub struct Provisioner {
    servers: Arc<dyn ServerRepository>,
    connector: Arc<dyn PanelConnector>,
    ledger: Arc<CreditLedger>,
    legacy: Option<LegacyApiConfig>,
    timeout: Duration,
    max_concurrency: usize,
}

impl Provisioner {
    pub fn new(
        servers: Arc<dyn ServerRepository>,
        connector: Arc<dyn PanelConnector>,
        ledger: Arc<CreditLedger>,
        config: &PanelsConfig,
    ) -> Self {
        Self {
            servers,
            connector,
            ledger,
            legacy: config.legacy_api.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    /// Renews every target on the panel responsible for its server.
    ///
    /// Targets whose server has no auto-renewing provider are skipped and
    /// left out of the results. Nothing here fails the whole call: each
    /// problem becomes a failed result for the logins it affects.
    pub async fn provision(
        &self,
        reseller: &Reseller,
        targets: Vec<ProvisioningTarget>,
        duration_days: i64,
    ) -> Vec<RenewalResult> {
        if targets.is_empty() {
            return Vec::new();
        }

        let providers = match self.servers.list_providers(reseller.id).await {
            Ok(providers) => providers,
            Err(e) => {
                tracing::error!(reseller_id = %reseller.id, error = %e, "Could not load panel providers");
                return targets
                    .into_iter()
                    .map(|t| RenewalResult::failed("unknown", t.username, format!("provider lookup failed: {}", e)))
                    .collect();
            }
        };

        let groups = self.group_by_provider(targets, &providers).await;

        let mut results = Vec::new();
        for (provider, targets) in groups {
            results.extend(self.run_provider(&provider, reseller, targets, duration_days).await);
        }
        results
    }

    /// Pairs targets with providers, preserving the order providers are
    /// first needed in.
    async fn group_by_provider(
        &self,
        targets: Vec<ProvisioningTarget>,
        providers: &[PanelProvider],
    ) -> Vec<(PanelProvider, Vec<ProvisioningTarget>)> {
        let mut resolved: HashMap<Uuid, Option<PanelProvider>> = HashMap::new();
        let mut groups: Vec<(PanelProvider, Vec<ProvisioningTarget>)> = Vec::new();

        for target in targets {
            let Some(server_id) = target.server_id else {
                tracing::info!(username = %target.username, "No server assigned, skipping panel renewal");
                continue;
            };

            if !resolved.contains_key(&server_id) {
                let provider = match self.servers.find_server(server_id).await {
                    Ok(Some(server)) => provider_for_server(&server, providers, self.legacy.as_ref()),
                    Ok(None) => None,
                    Err(e) => {
                        tracing::warn!(server_id = %server_id, error = %e, "Server lookup failed");
                        None
                    }
                };
                resolved.insert(server_id, provider);
            }

            let Some(Some(provider)) = resolved.get(&server_id) else {
                tracing::info!(
                    username = %target.username,
                    server_id = %server_id,
                    "No auto-renewing provider handles this server, skipping"
                );
                continue;
            };

            match groups
                .iter_mut()
                .find(|(p, _)| p.id == provider.id && p.name == provider.name)
            {
                Some((_, group)) => group.push(target),
                None => groups.push((provider.clone(), vec![target])),
            }
        }

        groups
    }

    async fn run_provider(
        &self,
        provider: &PanelProvider,
        reseller: &Reseller,
        targets: Vec<ProvisioningTarget>,
        duration_days: i64,
    ) -> Vec<RenewalResult> {
        let session = match self.bounded(self.connector.connect(provider)).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(provider = %provider.name, error = %e, "Could not open panel session");
                return targets
                    .into_iter()
                    .map(|t| RenewalResult::failed(&provider.name, t.username, format!("connection failed: {}", e)))
                    .collect();
            }
        };

        let session: &dyn PanelSession = session.as_ref();
        let results = stream::iter(targets)
            .map(|target| self.renew_one(session, reseller, target, duration_days))
            .buffer_unordered(self.max_concurrency)
            .collect::<Vec<_>>()
            .await;

        session.close().await;
        results
    }

    async fn renew_one(
        &self,
        session: &dyn PanelSession,
        reseller: &Reseller,
        target: ProvisioningTarget,
        duration_days: i64,
    ) -> RenewalResult {
        let panel = session.panel().to_string();
        let term = RenewalTerm {
            duration_days,
            months: credits_for(duration_days),
            due_date: target.due_date,
        };

        let record = match tokio::time::timeout(self.timeout, session.resolve(&target.username)).await {
            Ok(Lookup::Found(record)) => record,
            Ok(Lookup::NotFound) => {
                return RenewalResult::failed(panel, target.username, "login not found on panel");
            }
            Ok(Lookup::Transient(e)) => {
                return RenewalResult::failed(panel, target.username, format!("lookup failed: {}", e));
            }
            Err(_) => {
                return RenewalResult::failed(panel, target.username, "lookup timed out");
            }
        };

        if !session.requires_credits() {
            return match self.bounded(session.renew(&record, &term)).await {
                Ok(detail) => {
                    tracing::info!(panel = %panel, username = %target.username, "Panel renewal succeeded");
                    RenewalResult::ok(panel, target.username, detail)
                }
                Err(e) => {
                    tracing::warn!(panel = %panel, username = %target.username, error = %e, "Panel renewal failed");
                    RenewalResult::failed(panel, target.username, e.to_string())
                }
            };
        }

        let external = match self.bounded(session.credit_account(&record)).await {
            Ok(account) => account,
            Err(e) => {
                tracing::warn!(panel = %panel, username = %target.username, error = %e, "Panel balance unavailable");
                None
            }
        };

        let outcome = self
            .ledger
            .metered(reseller, term.months, external, || self.bounded(session.renew(&record, &term)))
            .await;

        match outcome {
            Ok(renewal) => {
                let detail = match &renewal.charge {
                    Some(charge) => format!("{} ({} credits from {})", renewal.detail, charge.credits, charge.ledger()),
                    None => renewal.detail,
                };
                tracing::info!(panel = %panel, username = %target.username, "Metered panel renewal succeeded");
                RenewalResult::ok(panel, target.username, detail)
            }
            Err(e) => {
                tracing::warn!(panel = %panel, username = %target.username, error = %e, "Metered panel renewal failed");
                RenewalResult::failed(panel, target.username, e.to_string())
            }
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, fut).await.unwrap_or_else(|_| {
            Err(AppError::Timeout(format!(
                "panel did not answer within {}s",
                self.timeout.as_secs()
            )))
        })
    }
}
