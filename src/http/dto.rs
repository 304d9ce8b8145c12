//! Wire shapes for the six routes of §6. Kept separate from the domain
//! types in `orchestrator`/`pool` so a rename of a JSON field never ripples
//! into core logic.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    cfg::enums::{ConnectionType, MessageSecurityMode, SecurityPolicy},
    orchestrator::ConnectRequest,
    pool::EntryView,
};

fn default_timeout_seconds() -> u64 {
    30
}

fn default_policy() -> SecurityPolicy {
    SecurityPolicy::Basic256Sha256
}

fn default_mode() -> MessageSecurityMode {
    MessageSecurityMode::SignAndEncrypt
}

/// `ConnectRequest` of §6: the mixed-case wire contract (`connectionType`,
/// `endpointURL`) is preserved exactly rather than normalized, since it's
/// an external, already-fixed interface.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectRequestDto {
    #[serde(rename = "connectionType")]
    pub connection_type: ConnectionType,
    #[serde(rename = "endpointURL")]
    pub endpoint_url: String,
    pub manufacturer: String,
    pub model: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub certificate_b64: Option<String>,
    #[serde(default)]
    pub key_b64: Option<String>,
    #[serde(default = "default_policy")]
    pub policy: SecurityPolicy,
    #[serde(default = "default_mode")]
    pub mode: MessageSecurityMode,
}

impl ConnectRequestDto {
    pub fn into_domain(self) -> ConnectRequest {
        ConnectRequest {
            connection_type: self.connection_type,
            endpoint_url: self.endpoint_url,
            manufacturer: self.manufacturer,
            model: self.model,
            timeout_seconds: self.timeout_seconds,
            username: self.username,
            password: self.password,
            certificate_b64: self.certificate_b64,
            key_b64: self.key_b64,
            policy: self.policy,
            mode: self.mode,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UuidRequest {
    pub uuid: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub uuid: Uuid,
    #[serde(rename = "endpointURL")]
    pub endpoint_url: String,
    pub manufacturer: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub use_count: u64,
    pub is_healthy: bool,
    pub is_polled: bool,
}

impl From<EntryView> for ConnectionInfo {
    fn from(v: EntryView) -> Self {
        ConnectionInfo {
            uuid: v.sid,
            endpoint_url: v.endpoint_url,
            manufacturer: v.manufacturer,
            model: v.model,
            created_at: v.created_at,
            last_used_at: v.last_used_at,
            use_count: v.use_count,
            is_healthy: v.is_healthy,
            is_polled: v.is_polled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionsResponse {
    #[serde(rename = "poolSize")]
    pub pool_size: u64,
    pub connections: Vec<ConnectionInfo>,
}
