pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::TraceLayer,
};
use std::sync::Arc;

use crate::{
    config::Settings,
    service::ServiceContext,
};
use state::AppState;

pub fn create_app(service_context: Arc<ServiceContext>, settings: Arc<Settings>) -> Router {
    let app_state = AppState::new(service_context, settings);

    Router::new()
        // Root and health endpoints
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))

        // Payment provider callbacks, authenticated by shared secret
        .nest("/webhooks", webhook_routes())

        // Operator API
        .nest("/api", api_routes(app_state.clone()))

        .with_state(app_state)

        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn webhook_routes() -> Router<AppState> {
    Router::new()
        .route("/payments", post(handlers::webhook::payment_notification))
}

fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/customers/:id/renew", post(handlers::renewals::renew_customer))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_api_key,
        ))
}
