use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::{
    domain::PanelProvider,
    error::{AppError, Result},
    panels::{
        api::{find_record, first_string, list_items, truncate},
        Lookup, PanelRecord, PanelSession, RenewalTerm,
    },
};

/// Package lengths the activation endpoint sells.
const ACTIVATION_MONTHS: &[i64] = &[1, 2, 3, 6, 12];

const DEPARTMENT_NAME_KEYS: &[&str] = &["name", "title", "label"];
const DEPARTMENT_ID_KEYS: &[&str] = &["id", "_id", "department_id"];

/// The package length closest to `duration_days`. Ties go to the shorter
/// package.
pub fn activation_months(duration_days: i64) -> i64 {
    let wanted = duration_days as f64 / 30.0;
    ACTIVATION_MONTHS
        .iter()
        .copied()
        .fold(ACTIVATION_MONTHS[0], |best, m| {
            if (m as f64 - wanted).abs() < (best as f64 - wanted).abs() {
                m
            } else {
                best
            }
        })
}

/// Session against a department-scoped activation panel. Every call after
/// connecting is made inside the department picked at connect time.
pub struct ActivationSession {
    name: String,
    base_url: String,
    api_key: String,
    http: reqwest::Client,
    department_id: String,
}

impl ActivationSession {
    pub async fn connect(provider: &PanelProvider, http: reqwest::Client) -> Result<Self> {
        let base_url = provider
            .base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AppError::Integration(format!("{}: base URL not configured", provider.name)))?
            .trim_end_matches('/')
            .to_string();
        let api_key = provider
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Integration(format!("{}: API key not configured", provider.name)))?;

        let response = http
            .get(format!("{}/api/departments", base_url))
            .bearer_auth(&api_key)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AppError::External(format!(
                "{}: listing departments returned {}",
                provider.name,
                response.status()
            )));
        }
        let departments = list_items(response.json::<Value>().await?);

        let department_id = pick_department(&departments, provider.department.as_deref())
            .ok_or_else(|| AppError::Integration(format!("{}: no usable department", provider.name)))?;
        tracing::debug!(panel = %provider.name, department_id = %department_id, "Department resolved");

        Ok(Self {
            name: provider.name.clone(),
            base_url,
            api_key,
            http,
            department_id,
        })
    }

    fn customers_url(&self) -> String {
        format!("{}/api/departments/{}/customers", self.base_url, self.department_id)
    }
}

/// The configured department by name, or the first one listed.
fn pick_department(departments: &[Value], wanted: Option<&str>) -> Option<String> {
    let wanted = wanted.map(str::trim).filter(|w| !w.is_empty());
    let chosen = match wanted {
        Some(name) => departments.iter().find(|d| {
            first_string(d, DEPARTMENT_NAME_KEYS).is_some_and(|n| n.trim().eq_ignore_ascii_case(name))
        })?,
        None => departments.first()?,
    };
    first_string(chosen, DEPARTMENT_ID_KEYS)
}

#[async_trait]
impl PanelSession for ActivationSession {
    fn panel(&self) -> &str {
        &self.name
    }

    async fn resolve(&self, username: &str) -> Lookup<PanelRecord> {
        let request = self
            .http
            .get(self.customers_url())
            .bearer_auth(&self.api_key)
            .query(&[("username", username)]);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Lookup::Transient(e.to_string()),
        };
        if response.status() == StatusCode::NOT_FOUND {
            return Lookup::NotFound;
        }
        if !response.status().is_success() {
            return Lookup::Transient(format!("customer search returned {}", response.status()));
        }

        match response.json::<Value>().await {
            Ok(body) => match find_record(&list_items(body), "customers", username) {
                Some(record) => Lookup::Found(record),
                None => Lookup::NotFound,
            },
            Err(e) => Lookup::Transient(e.to_string()),
        }
    }

    async fn renew(&self, record: &PanelRecord, term: &RenewalTerm) -> Result<String> {
        let months = activation_months(term.duration_days);
        let url = format!("{}/{}/activate", self.customers_url(), record.id);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "months": months, "department_id": self.department_id }))
            .send()
            .await?;
        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(panel = %self.name, error = %e, "Could not read activate response body");
                String::new()
            }
        };

        if !status.is_success() {
            return Err(AppError::External(format!(
                "{}: activate returned {}: {}",
                self.name,
                status,
                truncate(&text, 200)
            )));
        }
        Ok(format!("activated for {} month(s)", months))
    }
}
