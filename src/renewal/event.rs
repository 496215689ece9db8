//! Normalizes inbound payment notifications.
//!
//! Providers nest the same information at different depths, so each field
//! is read through an ordered table of JSON pointers; the first one that
//! yields a usable value wins.

use serde_json::Value;

use crate::error::{AppError, Result};

const STATUS_PROBES: &[&str] = &["/data/status", "/status", "/payment/status", "/event", "/type", "/action"];

const PHONE_PROBES: &[&str] = &[
    "/data/payer/phone",
    "/payer/phone",
    "/data/customer/phone",
    "/customer/phone",
    "/payment/payer/phone",
    "/data/phone",
    "/phone",
    "/payer_phone",
    "/customer_phone",
];

const AMOUNT_PROBES: &[&str] = &[
    "/data/transaction_amount",
    "/transaction_amount",
    "/data/amount",
    "/payment/amount",
    "/amount",
    "/data/value",
    "/value",
];

const TRANSACTION_PROBES: &[&str] = &[
    "/data/id",
    "/payment/id",
    "/transaction_id",
    "/data/txid",
    "/txid",
    "/end_to_end_id",
    "/id",
];

const SECRET_PROBES: &[&str] = &["/secret", "/webhook_secret"];

/// Status markers meaning the money has arrived.
const APPROVED_MARKERS: &[&str] = &["approved", "paid", "completed", "confirmed"];

/// A payment notification with provider-specific nesting removed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PaymentEvent {
    pub transaction_id: Option<String>,
    pub status: Option<String>,
    pub phone: Option<String>,
    pub amount_cents: Option<i64>,
    pub secret: Option<String>,
}

impl PaymentEvent {
    /// Reads `body`. A secret sent as a header takes precedence over one in
    /// the body.
    pub fn from_payload(body: &Value, header_secret: Option<&str>) -> Self {
        let secret = header_secret
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| first_match(body, SECRET_PROBES, text));

        Self {
            transaction_id: first_match(body, TRANSACTION_PROBES, text),
            status: first_match(body, STATUS_PROBES, text).map(|s| s.to_lowercase()),
            phone: first_match(body, PHONE_PROBES, phone),
            amount_cents: first_match(body, AMOUNT_PROBES, cents),
            secret,
        }
    }

    /// Whether the event reports an approved payment, either as a bare
    /// marker (`paid`) or as a dotted event name (`payment.approved`).
    pub fn is_approved(&self) -> bool {
        self.status.as_deref().is_some_and(|status| {
            APPROVED_MARKERS.iter().any(|marker| {
                status == *marker
                    || status
                        .rsplit_once('.')
                        .is_some_and(|(_, last)| last == *marker)
            })
        })
    }

    /// The payer phone, or a 400 when the payload carries none.
    pub fn require_phone(&self) -> Result<&str> {
        self.phone
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("Payload carries no payer phone".to_string()))
    }

    pub fn require_amount(&self) -> Result<i64> {
        match self.amount_cents {
            Some(cents) if cents > 0 => Ok(cents),
            _ => Err(AppError::BadRequest("Payload carries no positive amount".to_string())),
        }
    }
}

fn first_match<T>(body: &Value, probes: &[&str], extract: fn(&Value) -> Option<T>) -> Option<T> {
    probes
        .iter()
        .find_map(|pointer| body.pointer(pointer).and_then(extract))
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Phones come as strings, numbers, or `{area_code, number}` objects.
fn phone(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            let number = map.get("number").and_then(text)?;
            let area = map.get("area_code").and_then(text).unwrap_or_default();
            Some(format!("{}{}", area, number))
        }
        other => text(other),
    }
}

fn cents(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_f64().map(|v| (v * 100.0).round() as i64),
        Value::String(s) => parse_decimal(s).map(|v| (v * 100.0).round() as i64),
        _ => None,
    }
}

/// Parses amounts like `70.00`, `70,00`, `1.234,56` or `R$ 1,234.56`. When
/// both separators appear the last one is the decimal point.
fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();

    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(_)) => cleaned.replace(',', "."),
        _ => cleaned,
    };
    normalized.parse().ok()
}
