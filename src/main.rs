// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::{Context, Result};
use cnc_opc_gateway::{
    cfg::{cli::resolve_config_path, config::GatewayConfig, logger::init_logger},
    http::router,
    state::{build, connect_registry, default_factory},
};
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = match std::env::args().nth(1) {
        Some(path) => resolve_config_path(&path)
            .and_then(GatewayConfig::load_from_file)
            .context("failed to resolve or load config file")?,
        None => GatewayConfig::from_env().context("failed to build config from environment")?,
    };

    let _logger_guard = init_logger(&cfg.logging)?;

    let registry = connect_registry(&cfg).await.context("failed to connect registry")?;
    let bus = cnc_opc_gateway::state::build_event_bus(&cfg)?;
    let factory = default_factory();

    let state = build(registry, bus, factory, &cfg);

    info!("restoring persisted machine sessions");
    state.orchestrator.restore_all().await;
    info!(pool_size = state.pool.stats().pool_size, "restoration complete");

    let health_worker = state.pool.spawn_health_worker();

    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.server.port))
        .await
        .with_context(|| format!("failed to bind port {}", cfg.server.port))?;
    info!(port = cfg.server.port, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    state.pool.request_shutdown();
    let _ = health_worker.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
