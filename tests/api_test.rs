mod common;

use std::sync::Arc;

use autorenew::{api::create_app, domain::PanelFamily};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use common::*;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(app: axum::Router, request: Request<Body>) -> anyhow::Result<(StatusCode, Value)> {
    let response = app.oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes)? };
    Ok((status, body))
}

fn webhook(secret: &str, body: Value) -> anyhow::Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri("/webhooks/payments")
        .header("content-type", "application/json")
        .header("X-Webhook-Secret", secret)
        .body(Body::from(body.to_string()))?)
}

#[tokio::test]
async fn test_webhook_responses() -> anyhow::Result<()> {
    let connector = FakeConnector::new(vec![("sigma", FakePanel::with_users(&["ana01"]))]);
    let ctx = context(connector).await?;
    let reseller = reseller(&ctx, Some(10), None).await?;
    let plan_id = monthly_plan(&ctx, reseller.id).await?;
    let server_id = panel(&ctx, reseller.id, PanelFamily::Api, "Sigma Main", "sigma").await?;
    customer(&ctx, reseller.id, NewCustomer {
        phone: "11987654321",
        username: Some("ana01"),
        server_id: Some(server_id),
        plan_id: Some(plan_id),
        due_date: None,
    }).await?;
    let app = create_app(ctx, Arc::new(settings()));

    let paid = json!({"status": "approved", "phone": "11 98765-4321", "amount": "35,00"});

    let (status, _) = send(app.clone(), webhook("wrong", paid.clone())?).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(app.clone(), webhook(GLOBAL_SECRET, paid.clone())?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment_recorded"], true);
    assert_eq!(body["duration_days"], 30);
    assert_eq!(body["plan_name"], "Monthly");
    assert_eq!(body["server_renewals"][0]["username"], "ana01");
    assert_eq!(body["server_renewals"][0]["success"], true);

    let (status, body) = send(app.clone(), webhook(GLOBAL_SECRET, paid)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duplicate"], true);

    let stranger = json!({"status": "approved", "phone": "21999998888", "amount": 35});
    let (status, body) = send(app.clone(), webhook(GLOBAL_SECRET, stranger)?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["searched_variants"].as_array().is_some_and(|v| !v.is_empty()));

    let pending = json!({"event": "payment.created", "phone": "11987654321", "amount": 35});
    let (status, body) = send(app, webhook(GLOBAL_SECRET, pending)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ignored"], true);
    Ok(())
}

#[tokio::test]
async fn test_manual_renewal_requires_api_key() -> anyhow::Result<()> {
    let ctx = context(FakeConnector::new(vec![])).await?;
    let reseller = reseller(&ctx, Some(1), None).await?;
    let customer = customer(&ctx, reseller.id, NewCustomer {
        phone: "11987654321",
        username: None,
        server_id: None,
        plan_id: None,
        due_date: Some(today()),
    }).await?;
    let app = create_app(ctx, Arc::new(settings()));
    let uri = format!("/api/customers/{}/renew", customer.id);

    let anonymous = Request::builder()
        .method("POST")
        .uri(&uri)
        .header("content-type", "application/json")
        .body(Body::from(json!({"duration_days": 30}).to_string()))?;
    let (status, _) = send(app.clone(), anonymous).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let authorized = Request::builder()
        .method("POST")
        .uri(&uri)
        .header("content-type", "application/json")
        .header("X-Api-Key", ADMIN_KEY)
        .body(Body::from(json!({"duration_days": 30}).to_string()))?;
    let (status, body) = send(app, authorized).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["customer_id"], customer.id.to_string());
    assert_eq!(body["duration_days"], 30);
    Ok(())
}

#[tokio::test]
async fn test_health() -> anyhow::Result<()> {
    let ctx = context(FakeConnector::new(vec![])).await?;
    let app = create_app(ctx, Arc::new(settings()));

    let request = Request::builder().uri("/health").body(Body::empty())?;
    let (status, body) = send(app, request).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    Ok(())
}
