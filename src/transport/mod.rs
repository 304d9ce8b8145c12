//! The field-protocol client facade of §4.6: the seam the rest of the core
//! dials through. Defined purely as a trait so a production binary can swap
//! in a real OPC UA (or other industrial fieldbus) client without touching
//! the pool, the poller, or the codec.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod simulated;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    cfg::enums::{ConnectionType, MessageSecurityMode, SecurityPolicy},
    error::Result,
};

/// One data value read off a node. The shapes named in §4.5: unsigned
/// integer, float, boolean, localized text, a ranged numeric pair, an
/// engineering-units struct, or an array of extension objects.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    UInt32(u32),
    Float64(f64),
    Bool(bool),
    String(String),
    LocalizedText(String),
    Range { low: f64, high: f64 },
    EngineeringUnits { display_name: String, unit: String },
    ExtensionObjects(Vec<ExtensionObject>),
}

/// The two extension-object shapes the Heidenhain TNC640 family reads: a
/// cutter (axis) location and an entry of the program execution stack.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionObject {
    CutterLocation {
        coordinate_name: String,
        position: f64,
    },
    ProgramPosition {
        call_stack_level: u32,
        block_number: u32,
        program_name: String,
        block_content: String,
    },
}

/// A single advertised endpoint, as returned by discovery and consumed by
/// `SelectEndpoint` (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
    pub security_policy: SecurityPolicy,
    pub security_mode: MessageSecurityMode,
    pub user_identity_tokens: Vec<ConnectionType>,
}

/// Everything the pool needs to dial a session. Built by the orchestrator
/// from a validated `ConnectRequest` and the decoded credential.
#[derive(Debug, Clone)]
pub struct DialOptions {
    pub endpoint_url: String,
    pub security_policy: SecurityPolicy,
    pub security_mode: MessageSecurityMode,
    pub credential: DialCredential,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub enum DialCredential {
    Anonymous,
    Password { username: String, password: String },
    Certificate { cert_der: Vec<u8>, key_der: Vec<u8> },
}

/// The abstract field-protocol client (§4.6): `Read`/`Close`/`SessionID`.
/// One live handle is owned per `SessionEntry` in the pool; handles are
/// produced by a `FieldProtocolClientFactory`, never constructed directly,
/// so the pool can hold them behind `Arc<dyn FieldProtocolClient>`.
#[async_trait]
pub trait FieldProtocolClient: Send + Sync + std::fmt::Debug {
    /// Reads one node's current value.
    async fn read(&self, node_id: &str) -> Result<Variant>;

    /// Closes the underlying transport. Idempotent.
    async fn close(&self) -> Result<()>;

    /// The protocol-level session identifier reported by the remote side,
    /// if the protocol exposes one (used as a diagnostic, never as the
    /// pool's SID).
    fn session_id(&self) -> Option<String>;
}

/// Dials sessions and lists endpoints. Kept separate from
/// `FieldProtocolClient` so the latter stays a plain, dyn-safe handle.
#[async_trait]
pub trait FieldProtocolClientFactory: Send + Sync + std::fmt::Debug {
    /// Opens a session against `opts.endpoint_url` with the given
    /// credential and security settings.
    async fn dial(&self, opts: &DialOptions) -> Result<Arc<dyn FieldProtocolClient>>;

    /// Lists the endpoints advertised at the configured URL, for
    /// `SelectEndpoint` (§4.1).
    async fn discover_endpoints(&self, endpoint_url: &str) -> Result<Vec<Endpoint>>;

    /// Opens a bare TCP connection to `host:port` and drops it immediately;
    /// used for the orchestrator's reachability probe (§4.3 step 2).
    async fn probe_reachable(&self, endpoint_url: &str, timeout: Duration) -> Result<()>;
}
