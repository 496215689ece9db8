use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{
    api::state::AppState,
    error::Result,
    renewal::{ManualRenewal, RenewalSummary},
};

pub async fn renew_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ManualRenewal>>,
) -> Result<Json<RenewalSummary>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let summary = state
        .service_context
        .reconciliation
        .renew_customer(id, request)
        .await?;
    Ok(Json(summary))
}
