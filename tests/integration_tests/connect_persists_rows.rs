// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use cnc_opc_gateway::http::dto::ConnectionsResponse;
use tower::ServiceExt;
use uuid::Uuid;

use crate::integration_tests::common::{password_connect_body, test_router};

#[tokio::test]
async fn password_connect_persists_machine_and_credential_rows() {
    let (app, state) = test_router();

    let resp = app
        .clone()
        .oneshot(
            Request::post("/connect")
                .header("content-type", "application/json")
                .body(Body::from(password_connect_body("opc.tcp://fake:4840").to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let uuid: Uuid = serde_json::from_value(parsed["uuid"].clone()).unwrap();

    let resp = app.oneshot(Request::get("/connect").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let listed: ConnectionsResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(listed.pool_size, 1);
    assert_eq!(listed.connections[0].uuid, uuid);

    let machine = state.registry.get_machine(uuid).await.unwrap().expect("machine row must exist");
    assert_eq!(machine.endpoint_url, "opc.tcp://fake:4840");
    assert!(machine.pass_ref.is_some());

    let cred = state
        .registry
        .get_password_credential(machine.pass_ref.unwrap())
        .await
        .unwrap()
        .expect("password credential row must exist");
    assert_eq!(cred.username, "operator");
}
