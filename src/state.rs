//! Composition root: wires the pool, the polling engine, the registry, the
//! event bus, and the orchestrator into one `AppState`, and runs the
//! startup restoration sweep. Grounded on the teacher's `main.rs`, which
//! performs the equivalent wiring (`Pool::new` + `attach_self` + dial) by
//! hand rather than through a DI container.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::{
    bus::{EventBus, NullEventBus, StdoutEventBus},
    cfg::config::{EventBusKind, GatewayConfig},
    orchestrator::ConnectionOrchestrator,
    polling::PollingEngine,
    pool::SessionPool,
    registry::{InMemoryRegistry, PgRegistry, Registry},
    transport::{simulated::SimulatedFieldProtocolClientFactory, FieldProtocolClientFactory},
};

/// Everything an HTTP handler needs, handed to Axum as shared state.
pub struct AppState {
    pub pool: Arc<SessionPool>,
    pub polling: Arc<PollingEngine>,
    pub orchestrator: Arc<ConnectionOrchestrator>,
    pub registry: Arc<dyn Registry>,
}

/// Connects to Postgres, applies the demo-grade `CREATE TABLE IF NOT
/// EXISTS` migration, and wraps it as a `Registry`. Production deployments
/// that migrate the schema out-of-band can skip straight to `PgRegistry::new`.
pub async fn connect_registry(cfg: &GatewayConfig) -> anyhow::Result<Arc<dyn Registry>> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database.connection_url())
        .await
        .context("failed to connect to the registry database")?;
    let registry = PgRegistry::new(pool);
    registry.migrate().await.context("failed to migrate registry schema")?;
    Ok(Arc::new(registry))
}

/// An in-memory registry, used when no database is configured (local runs,
/// demos, integration tests that build `AppState` directly).
pub fn in_memory_registry() -> Arc<dyn Registry> {
    Arc::new(InMemoryRegistry::new())
}

pub fn build_event_bus(cfg: &GatewayConfig) -> anyhow::Result<Arc<dyn EventBus>> {
    match cfg.event_bus.kind {
        EventBusKind::Null => Ok(Arc::new(NullEventBus)),
        EventBusKind::Stdout => Ok(Arc::new(StdoutEventBus)),
        EventBusKind::Kafka => {
            #[cfg(feature = "kafka")]
            {
                let bus = crate::bus::kafka::KafkaEventBus::new(
                    &cfg.event_bus.brokers,
                    cfg.event_bus.topic.clone(),
                )?;
                Ok(Arc::new(bus))
            }
            #[cfg(not(feature = "kafka"))]
            {
                anyhow::bail!("event_bus.kind = kafka requires building with --features kafka")
            }
        },
    }
}

/// Wires pool, polling engine, registry, and bus into an `AppState`. Does
/// NOT run `RestoreAll` or spawn the health worker — callers decide when
/// (production `main` does both immediately after this returns).
pub fn build(
    registry: Arc<dyn Registry>,
    bus: Arc<dyn EventBus>,
    factory: Arc<dyn FieldProtocolClientFactory>,
    cfg: &GatewayConfig,
) -> Arc<AppState> {
    let pool = Arc::new(SessionPool::new(factory.clone(), cfg.pool.clone()));
    let polling = Arc::new(PollingEngine::new(pool.clone(), bus, registry.clone()));
    pool.attach_polling_engine(&polling);

    let orchestrator = Arc::new(ConnectionOrchestrator::new(
        pool.clone(),
        polling.clone(),
        registry.clone(),
        factory,
        cfg.pool.clone(),
    ));

    Arc::new(AppState {
        pool,
        polling,
        orchestrator,
        registry,
    })
}

/// The default field-protocol factory for this release: the simulated
/// transport (§4.6 — a real OPC UA client can be swapped in later without
/// touching the pool, the poller, or the codec).
pub fn default_factory() -> Arc<dyn FieldProtocolClientFactory> {
    Arc::new(SimulatedFieldProtocolClientFactory)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_wires_pool_and_polling_together() {
        let cfg = GatewayConfig::from_env().expect("test assertion");
        let state = build(in_memory_registry(), Arc::new(NullEventBus), default_factory(), &cfg);
        assert_eq!(state.pool.stats().pool_size, 0);
        state.orchestrator.restore_all().await;
        assert_eq!(state.pool.stats().pool_size, 0);
    }
}
