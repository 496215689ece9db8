use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::{
    api::state::AppState,
    error::AppError,
    renewal::Reconciliation,
};

pub const SECRET_HEADER: &str = "X-Webhook-Secret";

pub async fn payment_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Result<Response, AppError> {
    let Json(body) = body.ok_or_else(|| AppError::BadRequest("Expected a JSON body".to_string()))?;
    let header_secret = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());

    let outcome = state
        .service_context
        .reconciliation
        .reconcile(&body, header_secret)
        .await?;

    let response = match outcome {
        Reconciliation::Ignored { status } => (
            StatusCode::OK,
            Json(json!({
                "message": "Event ignored",
                "ignored": true,
                "status": status,
            })),
        )
            .into_response(),
        Reconciliation::NotFound { searched_variants } => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "No customer matches the payer phone",
                "searched_variants": searched_variants,
            })),
        )
            .into_response(),
        Reconciliation::Duplicate { customer_id, payment_id } => (
            StatusCode::OK,
            Json(json!({
                "message": "Payment already processed",
                "duplicate": true,
                "customer_id": customer_id,
                "payment_id": payment_id,
            })),
        )
            .into_response(),
        Reconciliation::Renewed(summary) => (StatusCode::OK, Json(summary)).into_response(),
    };

    Ok(response)
}
