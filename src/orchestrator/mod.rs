//! The Connection Orchestrator of §4.3: reconciles an incoming connect
//! request against the registry and the pool, never leaving a stale row
//! or an orphan session, and drives the one-shot startup restoration
//! sweep.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{sync::Arc, time::Duration};

use uuid::Uuid;

use crate::{
    cfg::{
        config::PoolTuning,
        enums::{ConnectionType, MachineStatus, MessageSecurityMode, SecurityPolicy},
    },
    credential::{
        decode_certificate, decode_private_key, from_base64, select_endpoint,
        verify_key_matches_cert,
    },
    error::{GatewayError, Result},
    pool::{ConnectionConfig, Sid, SessionPool},
    polling::PollingEngine,
    registry::{AnonCredentialRow, CertCredentialRow, MachineRow, PasswordCredentialRow, Registry},
    transport::FieldProtocolClientFactory,
};

/// The domain-level connect request, produced by the HTTP layer from
/// `ConnectRequestDto` (§6). Kept distinct from the wire DTO so the
/// orchestrator never depends on JSON shape or naming.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub connection_type: ConnectionType,
    pub endpoint_url: String,
    pub manufacturer: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub username: Option<String>,
    pub password: Option<String>,
    pub certificate_b64: Option<String>,
    pub key_b64: Option<String>,
    pub policy: SecurityPolicy,
    pub mode: MessageSecurityMode,
}

/// `Disconnect`'s result (§9 open-question resolution): both rows must
/// delete for a plain success; a session that was torn down but left a
/// stale registry row reports `PartialSuccess` rather than a bare error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    Disconnected,
    PartialSuccess,
}

/// One of the three credential shapes, already decoded and verified —
/// shared between `Connect` (from the wire request) and `RestoreAll`
/// (from the registry).
enum DecodedCredential {
    Anon,
    Password { username: String, password: String },
    Cert { cert_der: Vec<u8>, key_der: Vec<u8> },
}

pub struct ConnectionOrchestrator {
    pool: Arc<SessionPool>,
    polling: Arc<PollingEngine>,
    registry: Arc<dyn Registry>,
    factory: Arc<dyn FieldProtocolClientFactory>,
    tuning: PoolTuning,
}

impl ConnectionOrchestrator {
    pub fn new(
        pool: Arc<SessionPool>,
        polling: Arc<PollingEngine>,
        registry: Arc<dyn Registry>,
        factory: Arc<dyn FieldProtocolClientFactory>,
        tuning: PoolTuning,
    ) -> Self {
        Self {
            pool,
            polling,
            registry,
            factory,
            tuning,
        }
    }

    /// `Connect(req) → sid` (§4.3 steps 1-6).
    pub async fn connect(&self, req: &ConnectRequest) -> Result<Sid> {
        self.validate(req)?;
        self.factory
            .probe_reachable(&req.endpoint_url, self.tuning.reachability_timeout)
            .await?;

        if let Some(existing) = self
            .registry
            .find_machine_by_endpoint(&req.endpoint_url)
            .await
            .map_err(|e| GatewayError::persist("orchestrator.connect.find_by_endpoint", e))?
        {
            if self.pool.get(existing.uuid, false, false).await.is_ok() {
                let _ = self.pool.close(existing.uuid).await;
            }
            self.delete_machine_row(&existing).await?;
        }

        let decoded = decode_credential(req)?;
        let dial_opts = self
            .dial_options_for(
                &req.endpoint_url,
                req.connection_type,
                &decoded,
                req.policy,
                req.mode,
                Duration::from_secs(req.timeout_seconds),
                &req.manufacturer,
                &req.model,
            )
            .await?;

        let (sid, _entry) = self.pool.create(dial_opts).await?;

        if let Err(e) = self.persist_new_machine(sid, req, &decoded).await {
            let _ = self.pool.close(sid).await;
            return Err(e);
        }

        Ok(sid)
    }

    /// `Disconnect(sid) → did_close`.
    pub async fn disconnect(&self, sid: Sid) -> Result<DisconnectOutcome> {
        let entry = self.pool.get(sid, false, false).await?;

        if entry.is_polled().await {
            let _ = self.polling.stop(sid).await;
        }
        self.pool.close(sid).await?;

        let row = self
            .registry
            .get_machine(sid)
            .await
            .map_err(|e| GatewayError::persist("orchestrator.disconnect.get_machine", e))?;

        let Some(row) = row else {
            // Already reconciled away (e.g. a prior partial disconnect); the
            // session itself is gone, which is the caller's main concern.
            return Ok(DisconnectOutcome::Disconnected);
        };

        let mut partial = false;

        let cred_result = match row.connection_type {
            ConnectionType::Anonymous => match row.anon_ref {
                Some(id) => self.registry.delete_anon_credential(id).await,
                None => Ok(()),
            },
            ConnectionType::Password => match row.pass_ref {
                Some(id) => self.registry.delete_password_credential(id).await,
                None => Ok(()),
            },
            ConnectionType::Certificate => match row.cert_ref {
                Some(id) => self.registry.delete_cert_credential(id).await,
                None => Ok(()),
            },
        };
        if let Err(e) = cred_result {
            tracing::warn!(sid = %sid, error = %e, "disconnect: credential row delete failed");
            partial = true;
        }

        if let Err(e) = self.registry.delete_machine(sid).await {
            tracing::warn!(sid = %sid, error = %e, "disconnect: machine row delete failed");
            partial = true;
        }

        Ok(if partial {
            DisconnectOutcome::PartialSuccess
        } else {
            DisconnectOutcome::Disconnected
        })
    }

    /// `RestoreAll()`: invoked once at startup. Redials every persisted
    /// machine row; failures are logged per row and never abort the
    /// sweep — this is the one path where a row survives a dial failure.
    pub async fn restore_all(&self) {
        let rows = match self.registry.list_machines().await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "restore: failed to list machine rows");
                return;
            },
        };

        for row in rows {
            let endpoint = row.endpoint_url.clone();
            if let Err(e) = self.restore_one(row).await {
                tracing::warn!(endpoint_url = %endpoint, error = %e, "restore: failed to restore machine row");
            }
        }
    }

    async fn restore_one(&self, row: MachineRow) -> Result<()> {
        let decoded = self.load_decoded_credential(&row).await?;
        let dial_opts = self
            .dial_options_for(
                &row.endpoint_url,
                row.connection_type,
                &decoded,
                SecurityPolicy::Basic256Sha256,
                MessageSecurityMode::SignAndEncrypt,
                Duration::from_secs(row.poll_interval_seconds.max(1) as u64),
                &row.manufacturer,
                &row.model,
            )
            .await?;

        let (new_sid, _entry) = self.pool.create(dial_opts).await?;

        self.registry
            .replace_machine_sid(row.uuid, new_sid)
            .await
            .map_err(|e| GatewayError::persist("orchestrator.restore.replace_sid", e))?;

        if row.status == MachineStatus::Polled {
            self.polling.start(new_sid).await?;
        }

        Ok(())
    }

    fn validate(&self, req: &ConnectRequest) -> Result<()> {
        const OP: &str = "orchestrator.connect.validate";

        if req.endpoint_url.trim().is_empty() {
            return Err(GatewayError::validation(OP, "endpointURL must not be empty"));
        }
        if req.timeout_seconds == 0 {
            return Err(GatewayError::validation(
                OP,
                "timeout_seconds (poll interval) must not be zero",
            ));
        }

        match req.connection_type {
            ConnectionType::Password => {
                if req.username.as_deref().unwrap_or("").is_empty()
                    || req.password.as_deref().unwrap_or("").is_empty()
                {
                    return Err(GatewayError::validation(
                        OP,
                        "username and password are required for password connections",
                    ));
                }
            },
            ConnectionType::Certificate => {
                if req.certificate_b64.as_deref().unwrap_or("").is_empty()
                    || req.key_b64.as_deref().unwrap_or("").is_empty()
                {
                    return Err(GatewayError::validation(
                        OP,
                        "certificate_b64 and key_b64 are required for certificate connections",
                    ));
                }
            },
            ConnectionType::Anonymous => {},
        }

        Ok(())
    }

    async fn load_decoded_credential(&self, row: &MachineRow) -> Result<DecodedCredential> {
        const OP: &str = "orchestrator.restore.load_credential";
        match row.connection_type {
            ConnectionType::Anonymous => Ok(DecodedCredential::Anon),
            ConnectionType::Password => {
                let id = row
                    .pass_ref
                    .ok_or_else(|| GatewayError::internal(OP, anyhow::anyhow!("missing pass_ref")))?;
                let cred = self
                    .registry
                    .get_password_credential(id)
                    .await
                    .map_err(|e| GatewayError::persist(OP, e))?
                    .ok_or_else(|| GatewayError::not_found(OP))?;
                Ok(DecodedCredential::Password {
                    username: cred.username,
                    password: cred.password,
                })
            },
            ConnectionType::Certificate => {
                let id = row
                    .cert_ref
                    .ok_or_else(|| GatewayError::internal(OP, anyhow::anyhow!("missing cert_ref")))?;
                let cred = self
                    .registry
                    .get_cert_credential(id)
                    .await
                    .map_err(|e| GatewayError::persist(OP, e))?
                    .ok_or_else(|| GatewayError::not_found(OP))?;
                Ok(DecodedCredential::Cert {
                    cert_der: cred.certificate,
                    key_der: cred.key,
                })
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn dial_options_for(
        &self,
        endpoint_url: &str,
        connection_type: ConnectionType,
        decoded: &DecodedCredential,
        fallback_policy: SecurityPolicy,
        fallback_mode: MessageSecurityMode,
        timeout: Duration,
        manufacturer: &str,
        model: &str,
    ) -> Result<ConnectionConfig> {
        let endpoints = self.factory.discover_endpoints(endpoint_url).await?;
        let selected = select_endpoint(&endpoints, connection_type).unwrap_or_else(|_| {
            crate::transport::Endpoint {
                url: endpoint_url.to_string(),
                security_policy: fallback_policy,
                security_mode: fallback_mode,
                user_identity_tokens: vec![connection_type],
            }
        });

        Ok(match decoded {
            DecodedCredential::Anon => ConnectionConfig::Anon {
                endpoint: endpoint_url.to_string(),
                timeout,
                manufacturer: manufacturer.to_string(),
                model: model.to_string(),
            },
            DecodedCredential::Password { username, password } => ConnectionConfig::Password {
                endpoint: endpoint_url.to_string(),
                username: username.clone(),
                password: password.clone(),
                policy: selected.security_policy,
                mode: selected.security_mode,
                timeout,
                manufacturer: manufacturer.to_string(),
                model: model.to_string(),
            },
            DecodedCredential::Cert { cert_der, key_der } => ConnectionConfig::Cert {
                endpoint: endpoint_url.to_string(),
                cert_der: cert_der.clone(),
                key_der: key_der.clone(),
                policy: selected.security_policy,
                mode: selected.security_mode,
                timeout,
                manufacturer: manufacturer.to_string(),
                model: model.to_string(),
            },
        })
    }

    async fn persist_new_machine(
        &self,
        sid: Sid,
        req: &ConnectRequest,
        decoded: &DecodedCredential,
    ) -> Result<()> {
        const OP: &str = "orchestrator.connect.persist";
        let now = chrono::Utc::now();

        let (cert_ref, anon_ref, pass_ref) = match decoded {
            DecodedCredential::Anon => {
                let id = Uuid::new_v4();
                self.registry
                    .insert_anon_credential(AnonCredentialRow {
                        id,
                        policy: req.policy,
                        mode: req.mode,
                    })
                    .await
                    .map_err(|e| GatewayError::persist(OP, e))?;
                (None, Some(id), None)
            },
            DecodedCredential::Password { username, password } => {
                let id = Uuid::new_v4();
                self.registry
                    .insert_password_credential(PasswordCredentialRow {
                        id,
                        username: username.clone(),
                        password: password.clone(),
                        policy: req.policy,
                        mode: req.mode,
                    })
                    .await
                    .map_err(|e| GatewayError::persist(OP, e))?;
                (None, None, Some(id))
            },
            DecodedCredential::Cert { cert_der, key_der } => {
                let id = Uuid::new_v4();
                self.registry
                    .insert_cert_credential(CertCredentialRow {
                        id,
                        certificate: cert_der.clone(),
                        key: key_der.clone(),
                        policy: req.policy,
                        mode: req.mode,
                    })
                    .await
                    .map_err(|e| GatewayError::persist(OP, e))?;
                (Some(id), None, None)
            },
        };

        self.registry
            .insert_machine(MachineRow {
                uuid: sid,
                endpoint_url: req.endpoint_url.clone(),
                manufacturer: req.manufacturer.clone(),
                model: req.model.clone(),
                created_at: now,
                updated_at: now,
                status: MachineStatus::Connected,
                poll_interval_seconds: req.timeout_seconds as i64,
                connection_type: req.connection_type,
                cert_ref,
                anon_ref,
                pass_ref,
            })
            .await
            .map_err(|e| GatewayError::persist(OP, e))
    }

    async fn delete_machine_row(&self, row: &MachineRow) -> Result<()> {
        const OP: &str = "orchestrator.connect.delete_stale_row";
        match row.connection_type {
            ConnectionType::Anonymous => {
                if let Some(id) = row.anon_ref {
                    let _ = self.registry.delete_anon_credential(id).await;
                }
            },
            ConnectionType::Password => {
                if let Some(id) = row.pass_ref {
                    let _ = self.registry.delete_password_credential(id).await;
                }
            },
            ConnectionType::Certificate => {
                if let Some(id) = row.cert_ref {
                    let _ = self.registry.delete_cert_credential(id).await;
                }
            },
        }
        self.registry
            .delete_machine(row.uuid)
            .await
            .map_err(|e| GatewayError::persist(OP, e))
    }
}

/// `DecodeCertificate`/`DecodePrivateKey`/`VerifyKeyMatchesCert`/
/// `FromBase64` composed for the `ConnectRequest` shape, shared by
/// `Connect`.
fn decode_credential(req: &ConnectRequest) -> Result<DecodedCredential> {
    match req.connection_type {
        ConnectionType::Anonymous => Ok(DecodedCredential::Anon),
        ConnectionType::Password => Ok(DecodedCredential::Password {
            username: req.username.clone().unwrap_or_default(),
            password: req.password.clone().unwrap_or_default(),
        }),
        ConnectionType::Certificate => {
            let cert_b64 = req.certificate_b64.as_deref().unwrap_or_default();
            let key_b64 = req.key_b64.as_deref().unwrap_or_default();

            let cert_bytes = from_base64(cert_b64)?;
            let key_bytes = from_base64(key_b64)?;

            let cert = decode_certificate(&cert_bytes)?;
            let key = decode_private_key(&key_bytes)?;
            verify_key_matches_cert(&cert, &key)?;

            Ok(DecodedCredential::Cert {
                cert_der: cert.der_bytes().to_vec(),
                key_der: key.to_der()?,
            })
        },
    }
}
