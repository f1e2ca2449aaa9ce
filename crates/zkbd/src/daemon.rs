//! Server lifecycle: open the store, load tokens, serve until signalled

use anyhow::{Context, Result};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use zkb_core::config::ZkbConfig;
use zkb_proofs::{router, AppState, ProofMetrics, ProofStore, TokenAuthenticator};

use crate::metrics::HealthState;

pub async fn run(config: ZkbConfig) -> Result<()> {
    let store = ProofStore::from_config(&config.store)
        .await
        .context("opening proof store")?;
    let store = Arc::new(store);
    info!(backend = store.backend(), "proof store ready");

    let auth = TokenAuthenticator::from_config(&config.auth);
    if auth.is_empty() {
        warn!("no [auth.tokens] configured: every authenticated route will answer 401");
    } else {
        info!(tokens = auth.len(), "bearer tokens loaded");
    }

    let mut registry = Registry::default();
    let metrics = ProofMetrics::new(&mut registry);
    let registry = Arc::new(registry);

    if let Some(addr) = config.server.metrics_addr.clone() {
        let health = HealthState {
            registry: registry.clone(),
            store: store.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = crate::metrics::serve(addr, health).await {
                error!("metrics server failed: {e}");
            }
        });
    }

    let app = router(
        AppState::new(store, Arc::new(auth), metrics),
        config.server.body_limit_bytes,
    );

    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("binding {}", config.server.listen))?;
    info!(
        addr = %config.server.listen,
        production = config.server.production,
        "proof API listening on /api"
    );

    notify_ready();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal()?)
        .await
        .context("proof API server")?;

    info!("zkbd exiting cleanly");
    Ok(())
}

/// Resolves on the first SIGTERM or SIGINT.
fn shutdown_signal() -> Result<impl std::future::Future<Output = ()>> {
    let mut sigterm = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    })
}

fn notify_ready() {
    // sd_notify(READY=1); no-op outside systemd
    if let Ok(socket) = std::env::var("NOTIFY_SOCKET") {
        use std::os::unix::net::UnixDatagram;
        if let Ok(sock) = UnixDatagram::unbound() {
            let _ = sock.send_to(b"READY=1\n", &socket);
            tracing::debug!(notify_socket = %socket, "sent systemd READY=1");
        }
    }
}
