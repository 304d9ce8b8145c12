// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use cnc_opc_gateway::http::dto::ConnectionsResponse;
use tower::ServiceExt;

use crate::integration_tests::common::{anon_connect_body, test_router};

#[tokio::test]
async fn unreachable_endpoint_leaves_pool_and_registry_empty() {
    let (app, state) = test_router();

    // 192.0.2.0/24 is TEST-NET-1; the simulated transport always rejects it.
    let resp = app
        .clone()
        .oneshot(
            Request::post("/connect")
                .header("content-type", "application/json")
                .body(Body::from(anon_connect_body("opc.tcp://192.0.2.1:4840").to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let resp = app.oneshot(Request::get("/connect").body(Body::empty()).unwrap()).await.unwrap();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let listed: ConnectionsResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(listed.pool_size, 0);

    assert!(state.registry.list_machines().await.unwrap().is_empty());
}
