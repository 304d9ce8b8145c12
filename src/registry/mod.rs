//! The Registry collaborator of §4.7 / §6: the three-table CRUD surface
//! (`machines`, `cert_credentials`, `password_credentials`,
//! `anon_credentials`) behind a `Registry` trait, so the orchestrator and
//! restore routine never depend on a concrete store.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cfg::enums::{ConnectionType, MachineStatus, MessageSecurityMode, SecurityPolicy};

pub use memory::InMemoryRegistry;
pub use pg::PgRegistry;

/// `machines` row (§3 `MachineRecord`). `uuid` doubles as the pool SID —
/// that's the one field restoration rewrites in place (§4.3 `RestoreAll`).
#[derive(Debug, Clone, PartialEq)]
pub struct MachineRow {
    pub uuid: Uuid,
    pub endpoint_url: String,
    pub manufacturer: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: MachineStatus,
    /// Poll interval in seconds; internally named distinctly from the wire
    /// struct's `timeout_seconds` per the §9 open-question resolution.
    pub poll_interval_seconds: i64,
    pub connection_type: ConnectionType,
    pub cert_ref: Option<Uuid>,
    pub anon_ref: Option<Uuid>,
    pub pass_ref: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnonCredentialRow {
    pub id: Uuid,
    pub policy: SecurityPolicy,
    pub mode: MessageSecurityMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PasswordCredentialRow {
    pub id: Uuid,
    pub username: String,
    pub password: String,
    pub policy: SecurityPolicy,
    pub mode: MessageSecurityMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CertCredentialRow {
    pub id: Uuid,
    pub certificate: Vec<u8>,
    pub key: Vec<u8>,
    pub policy: SecurityPolicy,
    pub mode: MessageSecurityMode,
}

/// The three-table CRUD surface of §6, abstracted so the orchestrator can
/// be exercised against `InMemoryRegistry` in tests and `PgRegistry` in
/// production.
#[async_trait]
pub trait Registry: Send + Sync + std::fmt::Debug {
    async fn find_machine_by_endpoint(
        &self,
        endpoint_url: &str,
    ) -> anyhow::Result<Option<MachineRow>>;
    async fn get_machine(&self, uuid: Uuid) -> anyhow::Result<Option<MachineRow>>;
    async fn list_machines(&self) -> anyhow::Result<Vec<MachineRow>>;
    async fn insert_machine(&self, row: MachineRow) -> anyhow::Result<()>;
    /// Rewrites a machine row's primary key in place; used only by
    /// `RestoreAll`, which mints a new SID on every successful redial.
    async fn replace_machine_sid(
        &self,
        old_uuid: Uuid,
        new_uuid: Uuid,
    ) -> anyhow::Result<()>;
    async fn delete_machine(&self, uuid: Uuid) -> anyhow::Result<()>;
    /// Persists a transition between `CONNECTED` and `POLLED`; called from
    /// the polling start/stop paths so `RestoreAll` can tell which rows to
    /// resume polling for after a restart.
    async fn update_machine_status(
        &self,
        uuid: Uuid,
        status: MachineStatus,
    ) -> anyhow::Result<()>;

    async fn insert_anon_credential(&self, row: AnonCredentialRow) -> anyhow::Result<()>;
    async fn get_anon_credential(
        &self,
        id: Uuid,
    ) -> anyhow::Result<Option<AnonCredentialRow>>;
    async fn delete_anon_credential(&self, id: Uuid) -> anyhow::Result<()>;

    async fn insert_password_credential(
        &self,
        row: PasswordCredentialRow,
    ) -> anyhow::Result<()>;
    async fn get_password_credential(
        &self,
        id: Uuid,
    ) -> anyhow::Result<Option<PasswordCredentialRow>>;
    async fn delete_password_credential(&self, id: Uuid) -> anyhow::Result<()>;

    async fn insert_cert_credential(&self, row: CertCredentialRow) -> anyhow::Result<()>;
    async fn get_cert_credential(
        &self,
        id: Uuid,
    ) -> anyhow::Result<Option<CertCredentialRow>>;
    async fn delete_cert_credential(&self, id: Uuid) -> anyhow::Result<()>;
}

/// Used by handlers/orchestrator code that needs a `Result<T, GatewayError>`
/// from a `Registry` call tagged with the calling operation.
pub fn persist_err(op: &'static str, e: anyhow::Error) -> crate::error::GatewayError {
    crate::error::GatewayError::persist(op, e)
}
