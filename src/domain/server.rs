use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A provisioning panel a customer is assigned to, as recorded by the
/// reseller. Which adapter handles it is inferred from `name` and `host`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: Uuid,
    pub reseller_id: Uuid,
    pub name: String,
    pub host: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PanelFamily {
    /// Keyed-list HTTP API with inconsistent auth headers.
    Api,
    /// Direct connection to the panel's own MySQL database.
    Database,
    /// Department-scoped HTTP API exposing renewal as month activations.
    Activation,
}

impl PanelFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            PanelFamily::Api => "api",
            PanelFamily::Database => "database",
            PanelFamily::Activation => "activation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "api" => Some(PanelFamily::Api),
            "database" => Some(PanelFamily::Database),
            "activation" => Some(PanelFamily::Activation),
            _ => None,
        }
    }

    /// Vendor keywords used when a provider row doesn't list its own.
    pub fn default_keywords(&self) -> &'static [&'static str] {
        match self {
            PanelFamily::Api => &["sigma", "slim"],
            PanelFamily::Database => &["xui", "xtream"],
            PanelFamily::Activation => &["club", "p2p"],
        }
    }
}

/// Per-reseller connection settings for one panel vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelProvider {
    pub id: Uuid,
    pub reseller_id: Uuid,
    pub family: PanelFamily,
    pub name: String,
    pub base_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    #[serde(skip_serializing)]
    pub database_url: Option<String>,
    pub department: Option<String>,
    pub keywords: Vec<String>,
    pub enabled: bool,
    pub auto_renew: bool,
}

impl PanelProvider {
    pub fn keywords(&self) -> Vec<String> {
        if self.keywords.is_empty() {
            self.family
                .default_keywords()
                .iter()
                .map(|k| k.to_string())
                .collect()
        } else {
            self.keywords.iter().map(|k| k.to_lowercase()).collect()
        }
    }

    pub fn handles(&self, server: &Server) -> bool {
        let name = server.name.to_lowercase();
        let host = server.host.to_lowercase();
        self.keywords()
            .iter()
            .any(|k| !k.is_empty() && (name.contains(k.as_str()) || host.contains(k.as_str())))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePanelProviderRequest {
    pub reseller_id: Uuid,
    pub family: PanelFamily,
    pub name: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub database_url: Option<String>,
    pub department: Option<String>,
    pub keywords: Vec<String>,
    pub enabled: bool,
    pub auto_renew: bool,
}
