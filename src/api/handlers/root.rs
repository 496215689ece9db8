use axum::{extract::State, http::StatusCode, Json, response::IntoResponse};
use serde_json::json;

use crate::api::state::AppState;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "autorenew",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Renews reseller customers when their payments arrive",
        "status": "operational",
        "endpoints": {
            "health": "/health",
            "payments_webhook": "/webhooks/payments",
            "manual_renewal": "/api/customers/:id/renew"
        }
    }))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = sqlx::query("SELECT 1")
        .execute(&state.service_context.db_pool)
        .await
        .is_ok();

    let (status, label) = if database {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (status, Json(json!({
        "status": label,
        "database": database,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
