//! Prometheus and health endpoints, served apart from the proof API
//!
//! Endpoints:
//!   GET /metrics  Prometheus text format
//!   GET /healthz  liveness, 200 while the process runs
//!   GET /readyz   readiness, 200 when the proof store can persist

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus_client::{encoding::text::encode, registry::Registry};
use std::sync::Arc;
use zkb_proofs::ProofStore;

#[derive(Clone)]
pub struct HealthState {
    pub registry: Arc<Registry>,
    pub store: Arc<ProofStore>,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

/// Serve on `addr` (e.g. "127.0.0.1:9101") until the process exits.
pub async fn serve(addr: String, state: HealthState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("metrics bind {addr}: {e}"))?;

    tracing::info!(addr = %addr, "metrics: listening on /metrics, /healthz, /readyz");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| anyhow::anyhow!("metrics server: {e}"))
}

async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let mut body = String::new();
    match encode(&mut body, &state.registry) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz_handler(State(state): State<HealthState>) -> impl IntoResponse {
    match state.store.check_health().await {
        Ok(()) => (StatusCode::OK, "ready".to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, format!("store unavailable: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;
    use zkb_proofs::ProofMetrics;

    async fn get_text(app: Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn state(store: ProofStore) -> (HealthState, ProofMetrics) {
        let mut registry = Registry::default();
        let metrics = ProofMetrics::new(&mut registry);
        let state = HealthState {
            registry: Arc::new(registry),
            store: Arc::new(store),
        };
        (state, metrics)
    }

    #[tokio::test]
    async fn test_metrics_exposes_proof_counters() {
        let (state, metrics) = state(ProofStore::in_memory());
        metrics.upsert("invoice");

        let (status, body) = get_text(router(state), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#"zkb_proof_upserts_total{kind="invoice"} 1"#));
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let (state, _) = state(ProofStore::in_memory());
        assert_eq!(get_text(router(state.clone()), "/healthz").await.0, StatusCode::OK);
        assert_eq!(get_text(router(state), "/readyz").await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readyz_fails_without_store_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = ProofStore::open(tmp.path().join("gone/proofs.json")).await.unwrap();
        let (state, _) = state(store);

        let (status, body) = get_text(router(state), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.starts_with("store unavailable"));
    }
}
