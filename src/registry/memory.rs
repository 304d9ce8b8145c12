//! `InMemoryRegistry`: a `tokio::sync::RwLock`-guarded map standing in for
//! the three tables, used by unit and integration tests so the
//! orchestrator's reconciliation logic can be exercised without a
//! database.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::collections::HashMap;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::registry::{AnonCredentialRow, CertCredentialRow, MachineRow, PasswordCredentialRow, Registry};

#[derive(Debug, Default)]
struct Tables {
    machines: HashMap<Uuid, MachineRow>,
    anon_credentials: HashMap<Uuid, AnonCredentialRow>,
    password_credentials: HashMap<Uuid, PasswordCredentialRow>,
    cert_credentials: HashMap<Uuid, CertCredentialRow>,
}

#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    tables: RwLock<Tables>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn find_machine_by_endpoint(
        &self,
        endpoint_url: &str,
    ) -> anyhow::Result<Option<MachineRow>> {
        let tables = self.tables.read().await;
        Ok(tables.machines.values().find(|m| m.endpoint_url == endpoint_url).cloned())
    }

    async fn get_machine(&self, uuid: Uuid) -> anyhow::Result<Option<MachineRow>> {
        Ok(self.tables.read().await.machines.get(&uuid).cloned())
    }

    async fn list_machines(&self) -> anyhow::Result<Vec<MachineRow>> {
        Ok(self.tables.read().await.machines.values().cloned().collect())
    }

    async fn insert_machine(&self, row: MachineRow) -> anyhow::Result<()> {
        let mut tables = self.tables.write().await;
        if tables.machines.contains_key(&row.uuid) {
            return Err(anyhow!("machine {} already exists", row.uuid));
        }
        if tables.machines.values().any(|m| m.endpoint_url == row.endpoint_url) {
            return Err(anyhow!("endpoint_url {} already registered", row.endpoint_url));
        }
        tables.machines.insert(row.uuid, row);
        Ok(())
    }

    async fn replace_machine_sid(
        &self,
        old_uuid: Uuid,
        new_uuid: Uuid,
    ) -> anyhow::Result<()> {
        let mut tables = self.tables.write().await;
        let mut row = tables
            .machines
            .remove(&old_uuid)
            .ok_or_else(|| anyhow!("machine {old_uuid} not found"))?;
        row.uuid = new_uuid;
        row.updated_at = chrono::Utc::now();
        tables.machines.insert(new_uuid, row);
        Ok(())
    }

    async fn delete_machine(&self, uuid: Uuid) -> anyhow::Result<()> {
        self.tables.write().await.machines.remove(&uuid);
        Ok(())
    }

    async fn update_machine_status(
        &self,
        uuid: Uuid,
        status: crate::cfg::enums::MachineStatus,
    ) -> anyhow::Result<()> {
        let mut tables = self.tables.write().await;
        let row = tables
            .machines
            .get_mut(&uuid)
            .ok_or_else(|| anyhow!("machine {uuid} not found"))?;
        row.status = status;
        row.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn insert_anon_credential(&self, row: AnonCredentialRow) -> anyhow::Result<()> {
        self.tables.write().await.anon_credentials.insert(row.id, row);
        Ok(())
    }

    async fn get_anon_credential(
        &self,
        id: Uuid,
    ) -> anyhow::Result<Option<AnonCredentialRow>> {
        Ok(self.tables.read().await.anon_credentials.get(&id).cloned())
    }

    async fn delete_anon_credential(&self, id: Uuid) -> anyhow::Result<()> {
        self.tables.write().await.anon_credentials.remove(&id);
        Ok(())
    }

    async fn insert_password_credential(
        &self,
        row: PasswordCredentialRow,
    ) -> anyhow::Result<()> {
        self.tables.write().await.password_credentials.insert(row.id, row);
        Ok(())
    }

    async fn get_password_credential(
        &self,
        id: Uuid,
    ) -> anyhow::Result<Option<PasswordCredentialRow>> {
        Ok(self.tables.read().await.password_credentials.get(&id).cloned())
    }

    async fn delete_password_credential(&self, id: Uuid) -> anyhow::Result<()> {
        self.tables.write().await.password_credentials.remove(&id);
        Ok(())
    }

    async fn insert_cert_credential(&self, row: CertCredentialRow) -> anyhow::Result<()> {
        self.tables.write().await.cert_credentials.insert(row.id, row);
        Ok(())
    }

    async fn get_cert_credential(
        &self,
        id: Uuid,
    ) -> anyhow::Result<Option<CertCredentialRow>> {
        Ok(self.tables.read().await.cert_credentials.get(&id).cloned())
    }

    async fn delete_cert_credential(&self, id: Uuid) -> anyhow::Result<()> {
        self.tables.write().await.cert_credentials.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::cfg::enums::{ConnectionType, MachineStatus, MessageSecurityMode, SecurityPolicy};

    fn machine_row(uuid: Uuid, endpoint: &str) -> MachineRow {
        MachineRow {
            uuid,
            endpoint_url: endpoint.to_string(),
            manufacturer: "heidenhain".to_string(),
            model: "tnc640".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            status: MachineStatus::Connected,
            poll_interval_seconds: 30,
            connection_type: ConnectionType::Anonymous,
            cert_ref: None,
            anon_ref: Some(Uuid::new_v4()),
            pass_ref: None,
        }
    }

    #[tokio::test]
    async fn rejects_duplicate_endpoint_url() {
        let reg = InMemoryRegistry::new();
        reg.insert_machine(machine_row(Uuid::new_v4(), "opc.tcp://a:4840")).await.expect("test assertion");
        let err = reg
            .insert_machine(machine_row(Uuid::new_v4(), "opc.tcp://a:4840"))
            .await
            .expect_err("duplicate endpoint must be rejected");
        assert!(err.to_string().contains("already registered"));
    }

    #[tokio::test]
    async fn replace_machine_sid_moves_the_row() {
        let reg = InMemoryRegistry::new();
        let old = Uuid::new_v4();
        reg.insert_machine(machine_row(old, "opc.tcp://a:4840")).await.expect("test assertion");
        let new = Uuid::new_v4();
        reg.replace_machine_sid(old, new).await.expect("test assertion");
        assert!(reg.get_machine(old).await.expect("test assertion").is_none());
        assert!(reg.get_machine(new).await.expect("test assertion").is_some());
    }

    #[tokio::test]
    async fn anon_credential_round_trips() {
        let reg = InMemoryRegistry::new();
        let id = Uuid::new_v4();
        reg.insert_anon_credential(AnonCredentialRow {
            id,
            policy: SecurityPolicy::None,
            mode: MessageSecurityMode::None,
        })
        .await
        .expect("test assertion");
        assert!(reg.get_anon_credential(id).await.expect("test assertion").is_some());
        reg.delete_anon_credential(id).await.expect("test assertion");
        assert!(reg.get_anon_credential(id).await.expect("test assertion").is_none());
    }
}
