use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub panels: PanelsConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    /// Accepted for every reseller, in addition to per-reseller secrets.
    pub secret: Option<String>,
    /// Method tag written on payments created from webhook deliveries.
    pub payment_method: String,
    pub source: String,
    /// Retry window of the duplicate guard.
    pub duplicate_window_secs: i64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            payment_method: "instant_transfer".to_string(),
            source: "webhook".to_string(),
            duplicate_window_secs: 120,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PanelsConfig {
    /// Upper bound for every outbound panel call, HTTP or database.
    pub timeout_secs: u64,
    /// Provider renewals running at once within one invocation.
    pub max_concurrency: usize,
    /// Global fallback for the keyed-list API family, used when a reseller
    /// hasn't configured a provider of their own.
    pub legacy_api: Option<LegacyApiConfig>,
}

impl Default for PanelsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_concurrency: 5,
            legacy_api: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LegacyApiConfig {
    pub base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AdminConfig {
    /// Required in `X-Api-Key` by the manual renewal endpoint. When unset the
    /// endpoint refuses every request.
    pub api_key: Option<String>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.url", "sqlite://autorenew.db?mode=rwc")?
            .set_default("database.max_connections", 10)?
            .set_default("webhook.payment_method", "instant_transfer")?
            .set_default("webhook.source", "webhook")?
            .set_default("webhook.duplicate_window_secs", 120)?
            .set_default("panels.timeout_secs", 15)?
            .set_default("panels.max_concurrency", 5)?

            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // Add environment variables (with AUTORENEW__ prefix, double underscore separates levels)
            .add_source(Environment::with_prefix("AUTORENEW").separator("__"))

            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "sqlite://autorenew.db?mode=rwc".to_string(),
                max_connections: 10,
            },
            webhook: WebhookConfig::default(),
            panels: PanelsConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}
