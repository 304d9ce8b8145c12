//! `PgRegistry`: the production `Registry`, backed by `sqlx::PgPool` over
//! the four tables of §6. Queries are issued with the runtime `query`/
//! `query_as` API rather than the `query!` macros, since the macros need a
//! live database (or a checked `.sqlx` cache) at compile time.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    cfg::enums::{ConnectionType, MachineStatus, MessageSecurityMode, SecurityPolicy},
    registry::{AnonCredentialRow, CertCredentialRow, MachineRow, PasswordCredentialRow, Registry},
};

#[derive(Debug)]
pub struct PgRegistry {
    pool: PgPool,
}

impl PgRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the four tables if they don't already exist. Intended for
    /// local/demo runs; production deployments migrate the schema
    /// out-of-band.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS anon_credentials (
                id UUID PRIMARY KEY,
                policy TEXT NOT NULL,
                mode TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS password_credentials (
                id UUID PRIMARY KEY,
                username TEXT NOT NULL,
                password TEXT NOT NULL,
                policy TEXT NOT NULL,
                mode TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS cert_credentials (
                id UUID PRIMARY KEY,
                certificate BYTEA NOT NULL,
                key BYTEA NOT NULL,
                policy TEXT NOT NULL,
                mode TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS machines (
                uuid UUID PRIMARY KEY,
                endpoint_url TEXT NOT NULL UNIQUE,
                manufacturer TEXT NOT NULL,
                model TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                status TEXT NOT NULL,
                interval BIGINT NOT NULL,
                connection_type TEXT NOT NULL,
                cert_ref UUID REFERENCES cert_credentials(id),
                anon_ref UUID REFERENCES anon_credentials(id),
                pass_ref UUID REFERENCES password_credentials(id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .context("pg_registry.migrate")?;
        Ok(())
    }
}

fn policy_to_str(p: SecurityPolicy) -> &'static str {
    match p {
        SecurityPolicy::None => "None",
        SecurityPolicy::Basic128Rsa15 => "Basic128Rsa15",
        SecurityPolicy::Basic256 => "Basic256",
        SecurityPolicy::Basic256Sha256 => "Basic256Sha256",
    }
}

fn policy_from_str(s: &str) -> anyhow::Result<SecurityPolicy> {
    Ok(match s {
        "None" => SecurityPolicy::None,
        "Basic128Rsa15" => SecurityPolicy::Basic128Rsa15,
        "Basic256" => SecurityPolicy::Basic256,
        "Basic256Sha256" => SecurityPolicy::Basic256Sha256,
        other => return Err(anyhow!("unknown security policy: {other}")),
    })
}

fn mode_to_str(m: MessageSecurityMode) -> &'static str {
    match m {
        MessageSecurityMode::None => "None",
        MessageSecurityMode::Sign => "Sign",
        MessageSecurityMode::SignAndEncrypt => "SignAndEncrypt",
    }
}

fn mode_from_str(s: &str) -> anyhow::Result<MessageSecurityMode> {
    Ok(match s {
        "None" => MessageSecurityMode::None,
        "Sign" => MessageSecurityMode::Sign,
        "SignAndEncrypt" => MessageSecurityMode::SignAndEncrypt,
        other => return Err(anyhow!("unknown security mode: {other}")),
    })
}

fn conn_type_to_str(c: ConnectionType) -> &'static str {
    match c {
        ConnectionType::Anonymous => "anonymous",
        ConnectionType::Password => "password",
        ConnectionType::Certificate => "certificate",
    }
}

fn conn_type_from_str(s: &str) -> anyhow::Result<ConnectionType> {
    Ok(match s {
        "anonymous" => ConnectionType::Anonymous,
        "password" => ConnectionType::Password,
        "certificate" => ConnectionType::Certificate,
        other => return Err(anyhow!("unknown connection type: {other}")),
    })
}

fn status_to_str(s: MachineStatus) -> &'static str {
    match s {
        MachineStatus::Connected => "CONNECTED",
        MachineStatus::Polled => "POLLED",
    }
}

fn status_from_str(s: &str) -> anyhow::Result<MachineStatus> {
    Ok(match s {
        "CONNECTED" => MachineStatus::Connected,
        "POLLED" => MachineStatus::Polled,
        other => return Err(anyhow!("unknown machine status: {other}")),
    })
}

fn row_to_machine(row: &sqlx::postgres::PgRow) -> anyhow::Result<MachineRow> {
    Ok(MachineRow {
        uuid: row.try_get("uuid")?,
        endpoint_url: row.try_get("endpoint_url")?,
        manufacturer: row.try_get("manufacturer")?,
        model: row.try_get("model")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        status: status_from_str(&row.try_get::<String, _>("status")?)?,
        poll_interval_seconds: row.try_get("interval")?,
        connection_type: conn_type_from_str(&row.try_get::<String, _>("connection_type")?)?,
        cert_ref: row.try_get("cert_ref")?,
        anon_ref: row.try_get("anon_ref")?,
        pass_ref: row.try_get("pass_ref")?,
    })
}

#[async_trait]
impl Registry for PgRegistry {
    async fn find_machine_by_endpoint(
        &self,
        endpoint_url: &str,
    ) -> anyhow::Result<Option<MachineRow>> {
        let row = sqlx::query("SELECT * FROM machines WHERE endpoint_url = $1")
            .bind(endpoint_url)
            .fetch_optional(&self.pool)
            .await
            .context("pg_registry.find_machine_by_endpoint")?;
        row.as_ref().map(row_to_machine).transpose()
    }

    async fn get_machine(&self, uuid: Uuid) -> anyhow::Result<Option<MachineRow>> {
        let row = sqlx::query("SELECT * FROM machines WHERE uuid = $1")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await
            .context("pg_registry.get_machine")?;
        row.as_ref().map(row_to_machine).transpose()
    }

    async fn list_machines(&self) -> anyhow::Result<Vec<MachineRow>> {
        let rows = sqlx::query("SELECT * FROM machines")
            .fetch_all(&self.pool)
            .await
            .context("pg_registry.list_machines")?;
        rows.iter().map(row_to_machine).collect()
    }

    async fn insert_machine(&self, row: MachineRow) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO machines (uuid, endpoint_url, manufacturer, model, created_at, \
             updated_at, status, interval, connection_type, cert_ref, anon_ref, pass_ref) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)",
        )
        .bind(row.uuid)
        .bind(&row.endpoint_url)
        .bind(&row.manufacturer)
        .bind(&row.model)
        .bind(row.created_at)
        .bind(row.updated_at)
        .bind(status_to_str(row.status))
        .bind(row.poll_interval_seconds)
        .bind(conn_type_to_str(row.connection_type))
        .bind(row.cert_ref)
        .bind(row.anon_ref)
        .bind(row.pass_ref)
        .execute(&self.pool)
        .await
        .context("pg_registry.insert_machine")?;
        Ok(())
    }

    async fn replace_machine_sid(
        &self,
        old_uuid: Uuid,
        new_uuid: Uuid,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE machines SET uuid = $1, updated_at = now() WHERE uuid = $2",
        )
        .bind(new_uuid)
        .bind(old_uuid)
        .execute(&self.pool)
        .await
        .context("pg_registry.replace_machine_sid")?;
        Ok(())
    }

    async fn delete_machine(&self, uuid: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM machines WHERE uuid = $1")
            .bind(uuid)
            .execute(&self.pool)
            .await
            .context("pg_registry.delete_machine")?;
        Ok(())
    }

    async fn update_machine_status(
        &self,
        uuid: Uuid,
        status: MachineStatus,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE machines SET status = $1, updated_at = now() WHERE uuid = $2")
            .bind(status_to_str(status))
            .bind(uuid)
            .execute(&self.pool)
            .await
            .context("pg_registry.update_machine_status")?;
        Ok(())
    }

    async fn insert_anon_credential(&self, row: AnonCredentialRow) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO anon_credentials (id, policy, mode) VALUES ($1,$2,$3)")
            .bind(row.id)
            .bind(policy_to_str(row.policy))
            .bind(mode_to_str(row.mode))
            .execute(&self.pool)
            .await
            .context("pg_registry.insert_anon_credential")?;
        Ok(())
    }

    async fn get_anon_credential(
        &self,
        id: Uuid,
    ) -> anyhow::Result<Option<AnonCredentialRow>> {
        let row = sqlx::query("SELECT * FROM anon_credentials WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("pg_registry.get_anon_credential")?;
        row.map(|r| -> anyhow::Result<AnonCredentialRow> {
            Ok(AnonCredentialRow {
                id: r.try_get("id")?,
                policy: policy_from_str(&r.try_get::<String, _>("policy")?)?,
                mode: mode_from_str(&r.try_get::<String, _>("mode")?)?,
            })
        })
        .transpose()
    }

    async fn delete_anon_credential(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM anon_credentials WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("pg_registry.delete_anon_credential")?;
        Ok(())
    }

    async fn insert_password_credential(
        &self,
        row: PasswordCredentialRow,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO password_credentials (id, username, password, policy, mode) \
             VALUES ($1,$2,$3,$4,$5)",
        )
        .bind(row.id)
        .bind(&row.username)
        .bind(&row.password)
        .bind(policy_to_str(row.policy))
        .bind(mode_to_str(row.mode))
        .execute(&self.pool)
        .await
        .context("pg_registry.insert_password_credential")?;
        Ok(())
    }

    async fn get_password_credential(
        &self,
        id: Uuid,
    ) -> anyhow::Result<Option<PasswordCredentialRow>> {
        let row = sqlx::query("SELECT * FROM password_credentials WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("pg_registry.get_password_credential")?;
        row.map(|r| -> anyhow::Result<PasswordCredentialRow> {
            Ok(PasswordCredentialRow {
                id: r.try_get("id")?,
                username: r.try_get("username")?,
                password: r.try_get("password")?,
                policy: policy_from_str(&r.try_get::<String, _>("policy")?)?,
                mode: mode_from_str(&r.try_get::<String, _>("mode")?)?,
            })
        })
        .transpose()
    }

    async fn delete_password_credential(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM password_credentials WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("pg_registry.delete_password_credential")?;
        Ok(())
    }

    async fn insert_cert_credential(&self, row: CertCredentialRow) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO cert_credentials (id, certificate, key, policy, mode) VALUES \
             ($1,$2,$3,$4,$5)",
        )
        .bind(row.id)
        .bind(&row.certificate)
        .bind(&row.key)
        .bind(policy_to_str(row.policy))
        .bind(mode_to_str(row.mode))
        .execute(&self.pool)
        .await
        .context("pg_registry.insert_cert_credential")?;
        Ok(())
    }

    async fn get_cert_credential(
        &self,
        id: Uuid,
    ) -> anyhow::Result<Option<CertCredentialRow>> {
        let row = sqlx::query("SELECT * FROM cert_credentials WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("pg_registry.get_cert_credential")?;
        row.map(|r| -> anyhow::Result<CertCredentialRow> {
            Ok(CertCredentialRow {
                id: r.try_get("id")?,
                certificate: r.try_get("certificate")?,
                key: r.try_get("key")?,
                policy: policy_from_str(&r.try_get::<String, _>("policy")?)?,
                mode: mode_from_str(&r.try_get::<String, _>("mode")?)?,
            })
        })
        .transpose()
    }

    async fn delete_cert_credential(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM cert_credentials WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("pg_registry.delete_cert_credential")?;
        Ok(())
    }
}
