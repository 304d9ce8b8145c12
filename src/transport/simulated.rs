//! A `FieldProtocolClient` test double: an in-memory node-value table per
//! simulated machine, so the pool, poller, and codec can be exercised end to
//! end without a real controller. Grounded on the teacher's
//! `ClientConnection`/`Pool` pair — a cancellation token per handle, dashmap
//! for concurrent lookups — but replacing the iSCSI wire with a plain table.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    error::GatewayError,
    transport::{
        DialCredential, DialOptions, Endpoint, ExtensionObject, FieldProtocolClient,
        FieldProtocolClientFactory, Variant,
    },
};

/// TEST-NET-1, used by the seeded unreachable-endpoint scenario; any dial
/// attempt against a host in this block is rejected at `probe_reachable`.
const UNREACHABLE_PREFIX: &str = "192.0.2.";

/// Node values for one simulated machine, seeded with a plausible
/// Heidenhain TNC640 snapshot so polling scenarios have something to read.
fn seed_heidenhain_nodes(serial: &str) -> HashMap<String, Variant> {
    let mut m = HashMap::new();
    // The OPC UA "Root" folder, read by the pool's health probe (§4.2)
    // regardless of (manufacturer, model).
    m.insert("ns=0;i=84".to_string(), Variant::String("Root".to_string()));
    m.insert("ns=1;i=56004".to_string(), Variant::String(serial.to_string()));
    m.insert("ns=1;i=100024".to_string(), Variant::UInt32(2));
    m.insert(
        "ns=1;i=100039".to_string(),
        Variant::String("T12 D10".to_string()),
    );
    m.insert(
        "ns=1;i=100003".to_string(),
        Variant::ExtensionObjects(vec![
            ExtensionObject::CutterLocation {
                coordinate_name: "X".to_string(),
                position: 12.5,
            },
            ExtensionObject::CutterLocation {
                coordinate_name: "Y".to_string(),
                position: -3.2,
            },
        ]),
    );
    m.insert("ns=1;i=100025".to_string(), Variant::UInt32(100));
    m.insert(
        "ns=1;i=100026".to_string(),
        Variant::Range { low: 0.0, high: 150.0 },
    );
    m.insert(
        "ns=1;i=300002".to_string(),
        Variant::EngineeringUnits {
            display_name: "percent".to_string(),
            unit: "%".to_string(),
        },
    );
    m.insert("ns=1;i=100029".to_string(), Variant::UInt32(100));
    m.insert(
        "ns=1;i=100030".to_string(),
        Variant::Range { low: 0.0, high: 100.0 },
    );
    m.insert(
        "ns=1;i=300004".to_string(),
        Variant::EngineeringUnits {
            display_name: "percent".to_string(),
            unit: "%".to_string(),
        },
    );
    m.insert("ns=1;i=100031".to_string(), Variant::Bool(true));
    m.insert("ns=1;i=100027".to_string(), Variant::UInt32(100));
    m.insert(
        "ns=1;i=100028".to_string(),
        Variant::Range { low: 0.0, high: 120.0 },
    );
    m.insert(
        "ns=1;i=300003".to_string(),
        Variant::EngineeringUnits {
            display_name: "percent".to_string(),
            unit: "%".to_string(),
        },
    );
    m.insert("ns=1;i=56031".to_string(), Variant::Float64(123_456.0));
    m.insert("ns=1;i=56033".to_string(), Variant::Float64(654_321.0));
    m.insert("ns=1;i=56032".to_string(), Variant::Float64(7_200_000.0));
    m.insert(
        "ns=1;i=51002".to_string(),
        Variant::LocalizedText("Program running".to_string()),
    );
    m.insert(
        "ns=1;i=100005".to_string(),
        Variant::String("L12".to_string()),
    );
    m.insert(
        "ns=1;i=100006".to_string(),
        Variant::ExtensionObjects(vec![ExtensionObject::ProgramPosition {
            call_stack_level: 0,
            block_number: 42,
            program_name: "PART1.H".to_string(),
            block_content: "L X+10 Y-5 F1000".to_string(),
        }]),
    );
    m.insert(
        "ns=1;i=100022".to_string(),
        Variant::String("PART1.H".to_string()),
    );
    m.insert(
        "ns=1;i=100010".to_string(),
        Variant::LocalizedText("Program running".to_string()),
    );
    m.insert(
        "ns=1;i=100008".to_string(),
        Variant::LocalizedText("Idle to running".to_string()),
    );
    m
}

#[derive(Debug)]
pub struct SimulatedFieldProtocolClient {
    session_id: String,
    nodes: DashMap<String, Variant>,
    cancel: CancellationToken,
}

#[async_trait]
impl FieldProtocolClient for SimulatedFieldProtocolClient {
    async fn read(&self, node_id: &str) -> crate::error::Result<Variant> {
        if self.cancel.is_cancelled() {
            return Err(GatewayError::unreachable(
                "transport.simulated.read",
                std::io::Error::new(std::io::ErrorKind::NotConnected, "session closed"),
            ));
        }
        self.nodes
            .get(node_id)
            .map(|v| v.clone())
            .ok_or_else(|| GatewayError::not_found("transport.simulated.read"))
    }

    async fn close(&self) -> crate::error::Result<()> {
        self.cancel.cancel();
        Ok(())
    }

    fn session_id(&self) -> Option<String> {
        Some(self.session_id.clone())
    }
}

/// Builds `SimulatedFieldProtocolClient` handles. Each dial mints a fresh
/// serial number so that distinct sessions publish under distinct routing
/// keys.
#[derive(Debug, Default)]
pub struct SimulatedFieldProtocolClientFactory;

#[async_trait]
impl FieldProtocolClientFactory for SimulatedFieldProtocolClientFactory {
    async fn dial(
        &self,
        opts: &DialOptions,
    ) -> crate::error::Result<Arc<dyn FieldProtocolClient>> {
        self.probe_reachable(&opts.endpoint_url, opts.timeout).await?;

        match &opts.credential {
            DialCredential::Password { username, password } => {
                if username.is_empty() || password.is_empty() {
                    return Err(GatewayError::credential(
                        "transport.simulated.dial",
                        "empty username or password",
                    ));
                }
            },
            DialCredential::Certificate { cert_der, key_der } => {
                if cert_der.is_empty() || key_der.is_empty() {
                    return Err(GatewayError::credential(
                        "transport.simulated.dial",
                        "empty certificate or key",
                    ));
                }
            },
            DialCredential::Anonymous => {},
        }

        let serial = Uuid::new_v4().to_string();
        Ok(Arc::new(SimulatedFieldProtocolClient {
            session_id: serial.clone(),
            nodes: seed_heidenhain_nodes(&serial).into_iter().collect(),
            cancel: CancellationToken::new(),
        }))
    }

    async fn discover_endpoints(
        &self,
        endpoint_url: &str,
    ) -> crate::error::Result<Vec<Endpoint>> {
        use crate::cfg::enums::{ConnectionType, MessageSecurityMode, SecurityPolicy};

        Ok(vec![Endpoint {
            url: endpoint_url.to_string(),
            security_policy: SecurityPolicy::Basic256Sha256,
            security_mode: MessageSecurityMode::SignAndEncrypt,
            user_identity_tokens: vec![
                ConnectionType::Anonymous,
                ConnectionType::Password,
                ConnectionType::Certificate,
            ],
        }])
    }

    async fn probe_reachable(
        &self,
        endpoint_url: &str,
        timeout: Duration,
    ) -> crate::error::Result<()> {
        let host = host_from_endpoint_url(endpoint_url).ok_or_else(|| {
            GatewayError::validation(
                "transport.simulated.probe_reachable",
                format!("cannot parse host:port from {endpoint_url}"),
            )
        })?;

        if host.starts_with(UNREACHABLE_PREFIX) {
            return Err(GatewayError::unreachable(
                "transport.simulated.probe_reachable",
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("{endpoint_url} did not respond within {timeout:?}"),
                ),
            ));
        }

        let _ = tokio::time::timeout(timeout, async { Ok::<(), std::io::Error>(()) })
            .await
            .map_err(|_| {
                GatewayError::unreachable(
                    "transport.simulated.probe_reachable",
                    std::io::Error::new(std::io::ErrorKind::TimedOut, "probe timed out"),
                )
            })?;

        Ok(())
    }
}

/// Extracts `host:port` from an `opc.tcp://host:port/path`-shaped URL so the
/// reachability probe and the TEST-NET-1 check have something to inspect
/// without pulling in a full URL parser for one field.
fn host_from_endpoint_url(url: &str) -> Option<String> {
    let without_scheme = url.split("://").nth(1)?;
    let authority = without_scheme.split('/').next()?;
    let mut parts = authority.split(':');
    let host = parts.next()?;
    if host.is_empty() {
        return None;
    }
    // Validate the port is at least parseable; unused beyond that.
    if let Some(port) = parts.next() {
        let _: u16 = port.parse().ok()?;
    }
    Some(host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::enums::{MessageSecurityMode, SecurityPolicy};

    fn anon_opts(url: &str) -> DialOptions {
        DialOptions {
            endpoint_url: url.to_string(),
            security_policy: SecurityPolicy::None,
            security_mode: MessageSecurityMode::None,
            credential: DialCredential::Anonymous,
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn dial_then_read_serial() {
        let factory = SimulatedFieldProtocolClientFactory;
        let client = factory
            .dial(&anon_opts("opc.tcp://fake:4840"))
            .await
            .expect("dial should succeed");
        let v = client.read("ns=1;i=56004").await.expect("node is seeded");
        assert!(matches!(v, Variant::String(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_rejected() {
        let factory = SimulatedFieldProtocolClientFactory;
        let err = factory
            .dial(&anon_opts("opc.tcp://192.0.2.1:4840"))
            .await
            .expect_err("TEST-NET-1 host must be rejected");
        assert!(matches!(err, GatewayError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn read_after_close_is_unreachable() {
        let factory = SimulatedFieldProtocolClientFactory;
        let client = factory
            .dial(&anon_opts("opc.tcp://fake:4840"))
            .await
            .expect("dial should succeed");
        client.close().await.expect("close should succeed");
        let err = client
            .read("ns=1;i=56004")
            .await
            .expect_err("closed session must not serve reads");
        assert!(matches!(err, GatewayError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn unknown_node_id_is_not_found() {
        let factory = SimulatedFieldProtocolClientFactory;
        let client = factory
            .dial(&anon_opts("opc.tcp://fake:4840"))
            .await
            .expect("dial should succeed");
        let err = client
            .read("ns=1;i=999999")
            .await
            .expect_err("node id is not in the simulated table");
        assert!(matches!(err, GatewayError::NotFound { .. }));
    }
}
