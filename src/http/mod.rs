//! The HTTP surface of §4.9 / §6: a thin Axum `Router` exposing the six
//! routes, translating `GatewayError` into a status code and envelope.
//! No business logic lives here — every handler is a parse/validate step
//! followed by one call into the orchestrator or the pool.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod dto;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::instrument;

use crate::{
    error::GatewayError,
    http::dto::{ConnectRequestDto, ConnectionInfo, ConnectionsResponse, UuidRequest},
    orchestrator::DisconnectOutcome,
    state::AppState,
};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/connect", post(connect).delete(disconnect).get(list_connections))
        .route("/connect/check", post(check_connection))
        .route("/polling/start", get(start_polling))
        .route("/polling/stop", get(stop_polling))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Wraps a `GatewayError` for the one place it becomes an HTTP response.
struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GatewayError::Validation { .. } => StatusCode::BAD_REQUEST,
            GatewayError::NotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Credential { .. } => StatusCode::UNAUTHORIZED,
            GatewayError::Unreachable { .. }
            | GatewayError::Unhealthy { .. }
            | GatewayError::Persist { .. }
            | GatewayError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.0.to_string(),
            "op": self.0.op(),
        });
        (status, Json(body)).into_response()
    }
}

#[instrument(skip(state, req))]
async fn connect(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConnectRequestDto>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let domain_req = req.into_domain();
    let sid = state.orchestrator.connect(&domain_req).await?;
    Ok(Json(serde_json::json!({ "uuid": sid })))
}

#[instrument(skip(state))]
async fn disconnect(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UuidRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state.orchestrator.disconnect(req.uuid).await?;
    Ok(Json(serde_json::json!({
        "disconnected": matches!(outcome, DisconnectOutcome::Disconnected | DisconnectOutcome::PartialSuccess),
        "partial": matches!(outcome, DisconnectOutcome::PartialSuccess),
    })))
}

#[instrument(skip(state))]
async fn check_connection(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UuidRequest>,
) -> Result<Json<ConnectionInfo>, ApiError> {
    let entry = state.pool.get(req.uuid, true, false).await?;
    Ok(Json(ConnectionInfo::from(entry.snapshot().await)))
}

#[instrument(skip(state))]
async fn list_connections(State(state): State<Arc<AppState>>) -> Json<ConnectionsResponse> {
    let stats = state.pool.stats();
    let connections = state.pool.list().await.into_iter().map(ConnectionInfo::from).collect();
    Json(ConnectionsResponse {
        pool_size: stats.pool_size,
        connections,
    })
}

#[instrument(skip(state))]
async fn start_polling(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UuidRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.polling.start(req.uuid).await?;
    Ok(Json(serde_json::json!({ "polled": true })))
}

#[instrument(skip(state))]
async fn stop_polling(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UuidRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.polling.stop(req.uuid).await?;
    Ok(Json(serde_json::json!({ "polled": false })))
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use super::*;
    use crate::{
        bus::NullEventBus,
        cfg::config::GatewayConfig,
        state::{build, default_factory, in_memory_registry},
    };

    fn app() -> Router {
        let cfg = GatewayConfig::from_env().expect("test assertion");
        let state = build(in_memory_registry(), Arc::new(NullEventBus), default_factory(), &cfg);
        router(state)
    }

    #[tokio::test]
    async fn connect_then_list_reports_one_session() {
        let app = app();
        let body = serde_json::json!({
            "connectionType": "anonymous",
            "endpointURL": "opc.tcp://fake:4840",
            "manufacturer": "heidenhain",
            "model": "tnc640",
            "timeout_seconds": 30,
        });
        let resp = app
            .clone()
            .oneshot(
                Request::post("/connect")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("test assertion"),
            )
            .await
            .expect("test assertion");
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(Request::get("/connect").body(Body::empty()).expect("test assertion"))
            .await
            .expect("test assertion");
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.expect("test assertion");
        let parsed: ConnectionsResponse = serde_json::from_slice(&bytes).expect("test assertion");
        assert_eq!(parsed.pool_size, 1);
        assert_eq!(parsed.connections.len(), 1);
    }

    #[tokio::test]
    async fn connect_with_zero_timeout_is_bad_request() {
        let app = app();
        let body = serde_json::json!({
            "connectionType": "anonymous",
            "endpointURL": "opc.tcp://fake:4840",
            "manufacturer": "heidenhain",
            "model": "tnc640",
            "timeout_seconds": 0,
        });
        let resp = app
            .oneshot(
                Request::post("/connect")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("test assertion"),
            )
            .await
            .expect("test assertion");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn check_unknown_uuid_is_not_found() {
        let app = app();
        let body = serde_json::json!({ "uuid": uuid::Uuid::new_v4() });
        let resp = app
            .oneshot(
                Request::post("/connect/check")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("test assertion"),
            )
            .await
            .expect("test assertion");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
