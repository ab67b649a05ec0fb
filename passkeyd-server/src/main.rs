//! passkeyd Server - multi-tenant WebAuthn relying party over HTTP
//!
//! Exposes passkeyd-core ceremonies via per-tenant endpoints:
//! - POST /{tenant_id}/registration/{initialize,finalize}
//! - POST /{tenant_id}/login/{initialize,finalize}
//! - GET/PATCH/DELETE /{tenant_id}/credentials

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use passkeyd_server::{build_state, create_router_with_config, spawn_challenge_sweeper, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "passkeyd_server=info,passkeyd_core=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    config.validate()?;
    let tenants = config.load_tenants().context("loading tenant configuration")?;
    tracing::info!(tenants = tenants.len(), "Tenant configuration loaded");

    let state = build_state(&config, Arc::new(tenants))
        .await
        .context("initializing credential storage")?;
    let sweeper = spawn_challenge_sweeper(state.rp.sessions().clone(), config.sweep_interval());

    let app = create_router_with_config(state, &config);
    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("passkeyd-server listening on {}", addr);

    // Peer addresses feed the rate limiter's per-IP keys
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    tracing::info!("Gracefully shutdown");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
