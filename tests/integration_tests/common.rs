// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use cnc_opc_gateway::{
    bus::{EventBus, RecordingEventBus},
    cfg::config::GatewayConfig,
    http::router,
    state::{AppState, build, default_factory, in_memory_registry},
};
use uuid::Uuid;

pub fn test_config() -> GatewayConfig {
    GatewayConfig::from_env().expect("default config must validate")
}

/// Builds a full `AppState` wired against `InMemoryRegistry`, the simulated
/// transport, and a `RecordingEventBus`.
pub fn test_state() -> Arc<AppState> {
    let cfg = test_config();
    build(in_memory_registry(), Arc::new(RecordingEventBus::new()) as Arc<dyn EventBus>, default_factory(), &cfg)
}

pub fn test_router() -> (axum::Router, Arc<AppState>) {
    let state = test_state();
    (router(state.clone()), state)
}

pub fn anon_connect_body(endpoint: &str) -> serde_json::Value {
    serde_json::json!({
        "connectionType": "anonymous",
        "endpointURL": endpoint,
        "manufacturer": "heidenhain",
        "model": "tnc640",
        "timeout_seconds": 30,
    })
}

pub fn password_connect_body(endpoint: &str) -> serde_json::Value {
    serde_json::json!({
        "connectionType": "password",
        "endpointURL": endpoint,
        "manufacturer": "heidenhain",
        "model": "tnc640",
        "timeout_seconds": 30,
        "username": "operator",
        "password": "hunter2",
    })
}

pub fn uuid_body(uuid: Uuid) -> serde_json::Value {
    serde_json::json!({ "uuid": uuid })
}
