use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use crate::{
    domain::PanelProvider,
    error::{AppError, Result},
    panels::{Lookup, PanelRecord, PanelSession, RenewalTerm},
};

/// Ways these panels accept their API key, in the order they're tried.
const AUTH_PROBES: &[AuthStyle] = &[
    AuthStyle::Bearer,
    AuthStyle::XApiKey,
    AuthStyle::RawAuthorization,
    AuthStyle::ApiKeyHeader,
];

/// Usernames are only unique within a resource kind, so each is searched.
const RESOURCE_KINDS: &[&str] = &["lines", "trials"];

const LIST_KEYS: &[&str] = &["data", "items", "results", "users", "lines"];
const USERNAME_KEYS: &[&str] = &["username", "login", "user"];
const ID_KEYS: &[&str] = &["id", "_id", "user_id"];
const OWNER_KEYS: &[&str] = &["owner_id", "reseller_id", "member_id"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthStyle {
    Bearer,
    XApiKey,
    RawAuthorization,
    ApiKeyHeader,
}

impl AuthStyle {
    fn apply(self, request: RequestBuilder, key: &str) -> RequestBuilder {
        match self {
            AuthStyle::Bearer => request.bearer_auth(key),
            AuthStyle::XApiKey => request.header("X-Api-Key", key),
            AuthStyle::RawAuthorization => request.header("Authorization", key),
            AuthStyle::ApiKeyHeader => request.header("api-key", key),
        }
    }
}

/// Session against a keyed-list HTTP API panel. Remembers which auth header
/// style the panel accepted for the rest of the invocation.
pub struct ApiSession {
    name: String,
    base_url: String,
    api_key: String,
    http: reqwest::Client,
    auth: OnceCell<AuthStyle>,
}

impl ApiSession {
    pub fn new(provider: &PanelProvider, http: reqwest::Client) -> Result<Self> {
        let base_url = provider
            .base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AppError::Integration(format!("{}: base URL not configured", provider.name)))?;
        let api_key = provider
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Integration(format!("{}: API key not configured", provider.name)))?;

        Ok(Self {
            name: provider.name.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            http,
            auth: OnceCell::new(),
        })
    }

    /// Sends a request built by `build`, trying each auth style until the
    /// panel stops answering 401/403.
    async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        if let Some(style) = self.auth.get() {
            return Ok(style.apply(build(), &self.api_key).send().await?);
        }

        for style in AUTH_PROBES {
            let response = style.apply(build(), &self.api_key).send().await?;
            if matches!(response.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                tracing::debug!(panel = %self.name, ?style, "Auth style rejected");
                continue;
            }
            let _ = self.auth.set(*style);
            return Ok(response);
        }

        Err(AppError::Integration(format!("{}: every auth style was rejected", self.name)))
    }

    async fn search(&self, kind: &str, username: &str) -> Result<Option<Vec<Value>>> {
        let url = format!("{}/api/{}", self.base_url, kind);
        let response = self
            .send(|| self.http.get(&url).query(&[("search", username)]))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(AppError::External(format!(
                "{}: listing {} returned {}",
                self.name,
                kind,
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        Ok(Some(list_items(body)))
    }
}

#[async_trait]
impl PanelSession for ApiSession {
    fn panel(&self) -> &str {
        &self.name
    }

    async fn resolve(&self, username: &str) -> Lookup<PanelRecord> {
        let mut transient = None;

        for kind in RESOURCE_KINDS {
            match self.search(kind, username).await {
                Ok(Some(items)) => {
                    if let Some(record) = find_record(&items, kind, username) {
                        return Lookup::Found(record);
                    }
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(panel = %self.name, kind, username, error = %e, "Panel search failed");
                    transient = Some(e.to_string());
                }
            }
        }

        match transient {
            Some(error) => Lookup::Transient(error),
            None => Lookup::NotFound,
        }
    }

    async fn renew(&self, record: &PanelRecord, term: &RenewalTerm) -> Result<String> {
        let url = format!("{}/api/{}/{}/renew", self.base_url, record.scope, record.id);
        let body = json!({
            "months": term.months,
            "days": term.duration_days,
            "expires_at": term.due_date.format("%Y-%m-%d").to_string(),
        });

        let response = self.send(|| self.http.post(&url).json(&body)).await?;
        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(panel = %self.name, error = %e, "Could not read renew response body");
                String::new()
            }
        };

        if !status.is_success() {
            return Err(AppError::External(format!(
                "{}: renew returned {}: {}",
                self.name,
                status,
                truncate(&text, 200)
            )));
        }

        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string));
        Ok(message.unwrap_or_else(|| format!("renewed until {}", term.due_date)))
    }
}

/// Accepts either a bare array or an object wrapping one.
pub(super) fn list_items(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => LIST_KEYS
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                Some(Value::Object(inner)) => Some(list_items(Value::Object(inner))),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

pub(super) fn find_record(items: &[Value], kind: &str, username: &str) -> Option<PanelRecord> {
    let wanted = username.trim();
    items.iter().find_map(|item| {
        let name = first_string(item, USERNAME_KEYS)?;
        if !name.trim().eq_ignore_ascii_case(wanted) {
            return None;
        }
        Some(PanelRecord {
            id: first_string(item, ID_KEYS)?,
            username: name,
            scope: kind.to_string(),
            owner_id: first_string(item, OWNER_KEYS),
        })
    })
}

pub(super) fn first_string(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match item.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

pub(super) fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
