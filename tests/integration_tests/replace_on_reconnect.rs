// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use cnc_opc_gateway::http::dto::ConnectionsResponse;
use tower::ServiceExt;
use uuid::Uuid;

use crate::integration_tests::common::{anon_connect_body, test_router, uuid_body};

async fn connect(app: axum::Router, endpoint: &str) -> Uuid {
    let resp = app
        .oneshot(
            Request::post("/connect")
                .header("content-type", "application/json")
                .body(Body::from(anon_connect_body(endpoint).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    serde_json::from_value(parsed["uuid"].clone()).unwrap()
}

#[tokio::test]
async fn reconnecting_the_same_endpoint_replaces_the_prior_session() {
    let (app, state) = test_router();

    let first = connect(app.clone(), "opc.tcp://fake:4840").await;
    let second = connect(app.clone(), "opc.tcp://fake:4840").await;
    assert_ne!(first, second);

    let resp = app
        .clone()
        .oneshot(
            Request::post("/connect/check")
                .header("content-type", "application/json")
                .body(Body::from(uuid_body(first).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .clone()
        .oneshot(
            Request::post("/connect/check")
                .header("content-type", "application/json")
                .body(Body::from(uuid_body(second).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.oneshot(Request::get("/connect").body(Body::empty()).unwrap()).await.unwrap();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let listed: ConnectionsResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(listed.pool_size, 1);

    let rows = state.registry.list_machines().await.unwrap();
    assert_eq!(rows.iter().filter(|r| r.endpoint_url == "opc.tcp://fake:4840").count(), 1);
}
