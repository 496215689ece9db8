//! Local HTTP stand-ins for panel APIs.

use axum::Router;
use uuid::Uuid;

use crate::domain::{PanelFamily, PanelProvider};

/// Serves `router` on an ephemeral local port and returns its base URL.
pub(crate) async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

pub(crate) fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

pub(crate) fn provider(family: PanelFamily, base_url: &str, department: Option<&str>) -> PanelProvider {
    PanelProvider {
        id: Uuid::new_v4(),
        reseller_id: Uuid::nil(),
        family,
        name: "stub".to_string(),
        base_url: Some(base_url.to_string()),
        api_key: Some("panel-key".to_string()),
        database_url: None,
        department: department.map(str::to_string),
        keywords: Vec::new(),
        enabled: true,
        auto_renew: true,
    }
}
