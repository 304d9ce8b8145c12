// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use cnc_opc_gateway::{
    bus::NullEventBus,
    cfg::enums::{ConnectionType, MachineStatus, MessageSecurityMode, SecurityPolicy},
    registry::{AnonCredentialRow, MachineRow, Registry},
    state::{build, default_factory, in_memory_registry},
};
use uuid::Uuid;

use crate::integration_tests::common::test_config;

#[tokio::test]
async fn restore_all_reconnects_every_row_and_resumes_polling_for_polled_rows() {
    let cfg = test_config();
    let registry = in_memory_registry();

    let connected_cred = Uuid::new_v4();
    registry
        .insert_anon_credential(AnonCredentialRow {
            id: connected_cred,
            policy: SecurityPolicy::Basic256Sha256,
            mode: MessageSecurityMode::SignAndEncrypt,
        })
        .await
        .unwrap();
    let connected_uuid = Uuid::new_v4();
    registry
        .insert_machine(MachineRow {
            uuid: connected_uuid,
            endpoint_url: "opc.tcp://a:4840".to_string(),
            manufacturer: "heidenhain".to_string(),
            model: "tnc640".to_string(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            status: MachineStatus::Connected,
            poll_interval_seconds: 30,
            connection_type: ConnectionType::Anonymous,
            cert_ref: None,
            anon_ref: Some(connected_cred),
            pass_ref: None,
        })
        .await
        .unwrap();

    let polled_cred = Uuid::new_v4();
    registry
        .insert_anon_credential(AnonCredentialRow {
            id: polled_cred,
            policy: SecurityPolicy::Basic256Sha256,
            mode: MessageSecurityMode::SignAndEncrypt,
        })
        .await
        .unwrap();
    let polled_uuid = Uuid::new_v4();
    registry
        .insert_machine(MachineRow {
            uuid: polled_uuid,
            endpoint_url: "opc.tcp://b:4840".to_string(),
            manufacturer: "heidenhain".to_string(),
            model: "tnc640".to_string(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            status: MachineStatus::Polled,
            poll_interval_seconds: 30,
            connection_type: ConnectionType::Anonymous,
            cert_ref: None,
            anon_ref: Some(polled_cred),
            pass_ref: None,
        })
        .await
        .unwrap();

    let state = build(registry, Arc::new(NullEventBus), default_factory(), &cfg);
    state.orchestrator.restore_all().await;

    let views = state.pool.list().await;
    assert_eq!(views.len(), 2);

    let connected_view = views.iter().find(|v| v.endpoint_url == "opc.tcp://a:4840").unwrap();
    let polled_view = views.iter().find(|v| v.endpoint_url == "opc.tcp://b:4840").unwrap();
    assert!(!connected_view.is_polled);
    assert!(polled_view.is_polled);
    assert!(state.polling.is_active(polled_view.sid).await);
    assert!(!state.polling.is_active(connected_view.sid).await);

    // The rewritten rows carry fresh SIDs, not the ones seeded above.
    assert_ne!(connected_view.sid, connected_uuid);
    assert_ne!(polled_view.sid, polled_uuid);
}
