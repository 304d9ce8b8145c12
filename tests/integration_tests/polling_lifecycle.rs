// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use cnc_opc_gateway::{cfg::enums::MachineStatus, http::dto::ConnectionInfo};
use tower::ServiceExt;
use uuid::Uuid;

use crate::integration_tests::common::{anon_connect_body, test_router, uuid_body};

async fn check(app: axum::Router, uuid: Uuid) -> ConnectionInfo {
    let resp = app
        .oneshot(
            Request::post("/connect/check")
                .header("content-type", "application/json")
                .body(Body::from(uuid_body(uuid).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn starting_and_stopping_polling_flips_is_polled() {
    let (app, state) = test_router();

    let resp = app
        .clone()
        .oneshot(
            Request::post("/connect")
                .header("content-type", "application/json")
                .body(Body::from(anon_connect_body("opc.tcp://fake:4840").to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let uuid: Uuid = serde_json::from_value(parsed["uuid"].clone()).unwrap();

    assert!(!check(app.clone(), uuid).await.is_polled);

    let resp = app
        .clone()
        .oneshot(
            Request::get("/polling/start")
                .header("content-type", "application/json")
                .body(Body::from(uuid_body(uuid).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(check(app.clone(), uuid).await.is_polled);

    let row = state.registry.get_machine(uuid).await.unwrap().unwrap();
    assert_eq!(row.status, MachineStatus::Polled);

    // Starting an already-polling session is rejected.
    let resp = app
        .clone()
        .oneshot(
            Request::get("/polling/start")
                .header("content-type", "application/json")
                .body(Body::from(uuid_body(uuid).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .clone()
        .oneshot(
            Request::get("/polling/stop")
                .header("content-type", "application/json")
                .body(Body::from(uuid_body(uuid).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(!check(app.clone(), uuid).await.is_polled);

    let row = state.registry.get_machine(uuid).await.unwrap().unwrap();
    assert_eq!(row.status, MachineStatus::Connected);

    let resp = app
        .oneshot(
            Request::get("/polling/stop")
                .header("content-type", "application/json")
                .body(Body::from(uuid_body(uuid).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
