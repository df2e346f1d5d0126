//! Read-only admin API.
//!
//! Serializes what the core exposes (node registry, call cache, admission
//! rate, config) as JSON. Nothing here mutates balancer state.

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::config::BalancerConfig;
use crate::dialog::CallCache;
use crate::lifecycle::Balancer;
use self::auth::admin_auth_middleware;
use self::handlers::*;

#[derive(Clone)]
pub struct AdminState {
    pub cache: CallCache,
    pub config: Arc<BalancerConfig>,
    pub local_addr: SocketAddr,
    pub workers: usize,
}

impl AdminState {
    pub fn from_balancer(balancer: &Balancer) -> Self {
        Self {
            cache: balancer.cache().clone(),
            config: balancer.config().clone(),
            local_addr: balancer.local_addr(),
            workers: balancer.workers(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/nodes", get(get_nodes))
        .route("/admin/cache", get(get_cache))
        .route("/admin/stats", get(get_stats))
        .route("/admin/config", get(get_config))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until shutdown.
pub async fn serve(
    state: AdminState,
    bind_address: SocketAddr,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::CacheSettings;
    use crate::load_balancer::node::SipNode;
    use crate::load_balancer::registry::NodeRegistry;
    use crate::load_balancer::DistributionKind;
    use crate::security::rate_limit::AdmissionLimiter;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::time::Duration;
    use tokio::runtime::Handle;
    use tower::ServiceExt;

    fn state() -> AdminState {
        let node = Arc::new(SipNode::new("127.0.0.1:5080".parse().unwrap(), "core", 2, 1));
        let cache = CallCache::new(
            Arc::new(NodeRegistry::from_nodes(vec![node], DistributionKind::Weighted)),
            Arc::new(AdmissionLimiter::new(10)),
            CacheSettings {
                timeout: Duration::from_secs(32),
                clear: Duration::from_secs(10),
                probe_timeout: Duration::from_secs(5),
                local_address: "127.0.0.1:5060".to_string(),
            },
            Handle::current(),
        );
        let mut config = BalancerConfig::default();
        config.admin.api_key = "test-key".to_string();
        AdminState {
            cache,
            config: Arc::new(config),
            local_addr: "127.0.0.1:5060".parse().unwrap(),
            workers: 4,
        }
    }

    async fn get(router: Router, path: &str, token: Option<&str>) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().uri(path);
        if let Some(token) = token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        let response = router.oneshot(request.body(Body::empty()).unwrap()).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_requires_bearer_token() {
        let router = setup_admin_router(state());
        let (status, _) = get(router.clone(), "/admin/status", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = get(router, "/admin/status", Some("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_read_only_views() {
        let state = state();
        let node = state.cache.registry().nodes()[0].clone();
        state.cache.open_probe(&node);
        let router = setup_admin_router(state);

        let (status, json) = get(router.clone(), "/admin/nodes", Some("test-key")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["distribution"], "weighted");
        assert_eq!(json["nodes"][0]["weight"], 2);
        assert_eq!(json["nodes"][0]["address"], "127.0.0.1:5080");

        let (_, json) = get(router.clone(), "/admin/cache", Some("test-key")).await;
        assert_eq!(json["size"], 1);
        assert_eq!(json["entries"][0]["is_probe"], true);

        let (_, json) = get(router.clone(), "/admin/stats", Some("test-key")).await;
        assert_eq!(json["cache_size"], 1);
        assert_eq!(json["max_calls_per_second"], 10);
        assert_eq!(json["workers"], 4);

        let (_, json) = get(router, "/admin/config", Some("test-key")).await;
        assert_eq!(json["admin"]["api_key"], "<redacted>");
    }
}
