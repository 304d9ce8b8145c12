//! The Session Pool of §4.2: the authoritative in-memory map from SID to
//! live session, plus the background health/idle-cleanup loop. Grounded on
//! the teacher's `client::pool_sessions::Pool` — a `DashMap` keyed map, a
//! `Weak` back-reference set once via `OnceCell` so two owners never form a
//! reference cycle — generalized from TSIH-keyed iSCSI sessions to
//! UUID-keyed field-protocol sessions with health probing and idle
//! eviction added on top.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::RwLock as AsyncRwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    cfg::{
        config::PoolTuning,
        enums::{MessageSecurityMode, SecurityPolicy},
    },
    error::{GatewayError, Result},
    polling::PollingEngine,
    transport::{DialCredential, DialOptions, FieldProtocolClient, FieldProtocolClientFactory},
};

/// Opaque session identifier: a random UUIDv4 minted by `Create`.
pub type Sid = Uuid;

/// The standard OPC UA "Root" folder node, used as the minimal read for
/// `Probe` (§4.2): any controller that's still responding to reads will
/// answer this one regardless of (manufacturer, model).
pub const ROOT_FOLDER_NODE_ID: &str = "ns=0;i=84";

/// §3 `ConnectionConfig`: a tagged variant carrying everything needed to
/// (re)dial a session, keyed by credential shape, per the §9 design note
/// on tagged connection configs.
#[derive(Debug, Clone)]
pub enum ConnectionConfig {
    Anon {
        endpoint: String,
        timeout: Duration,
        manufacturer: String,
        model: String,
    },
    Password {
        endpoint: String,
        username: String,
        password: String,
        policy: SecurityPolicy,
        mode: MessageSecurityMode,
        timeout: Duration,
        manufacturer: String,
        model: String,
    },
    Cert {
        endpoint: String,
        cert_der: Vec<u8>,
        key_der: Vec<u8>,
        policy: SecurityPolicy,
        mode: MessageSecurityMode,
        timeout: Duration,
        manufacturer: String,
        model: String,
    },
}

impl ConnectionConfig {
    pub fn endpoint_url(&self) -> &str {
        match self {
            ConnectionConfig::Anon { endpoint, .. }
            | ConnectionConfig::Password { endpoint, .. }
            | ConnectionConfig::Cert { endpoint, .. } => endpoint,
        }
    }

    pub fn timeout(&self) -> Duration {
        match self {
            ConnectionConfig::Anon { timeout, .. }
            | ConnectionConfig::Password { timeout, .. }
            | ConnectionConfig::Cert { timeout, .. } => *timeout,
        }
    }

    pub fn manufacturer(&self) -> &str {
        match self {
            ConnectionConfig::Anon { manufacturer, .. }
            | ConnectionConfig::Password { manufacturer, .. }
            | ConnectionConfig::Cert { manufacturer, .. } => manufacturer,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            ConnectionConfig::Anon { model, .. }
            | ConnectionConfig::Password { model, .. }
            | ConnectionConfig::Cert { model, .. } => model,
        }
    }

    fn to_dial_options(&self) -> DialOptions {
        match self {
            ConnectionConfig::Anon { endpoint, timeout, .. } => DialOptions {
                endpoint_url: endpoint.clone(),
                security_policy: SecurityPolicy::None,
                security_mode: MessageSecurityMode::None,
                credential: DialCredential::Anonymous,
                timeout: *timeout,
            },
            ConnectionConfig::Password {
                endpoint,
                username,
                password,
                policy,
                mode,
                timeout,
                ..
            } => DialOptions {
                endpoint_url: endpoint.clone(),
                security_policy: *policy,
                security_mode: *mode,
                credential: DialCredential::Password {
                    username: username.clone(),
                    password: password.clone(),
                },
                timeout: *timeout,
            },
            ConnectionConfig::Cert {
                endpoint,
                cert_der,
                key_der,
                policy,
                mode,
                timeout,
                ..
            } => DialOptions {
                endpoint_url: endpoint.clone(),
                security_policy: *policy,
                security_mode: *mode,
                credential: DialCredential::Certificate {
                    cert_der: cert_der.clone(),
                    key_der: key_der.clone(),
                },
                timeout: *timeout,
            },
        }
    }
}

/// Mutable fields of a `SessionEntry`, guarded by the entry's own
/// readers-writer lock (§5): readers predominate, writers are `mark_used`,
/// `set_healthy`, `set_polled`.
#[derive(Debug)]
struct EntryMutable {
    last_used_at: DateTime<Utc>,
    use_count: u64,
    is_healthy: bool,
    is_polled: bool,
}

/// §3 `SessionEntry`: in-memory, owned exclusively by the pool. The
/// Polling Engine refers to it only by SID (§9 cyclic-ownership note).
#[derive(Debug)]
pub struct SessionEntry {
    pub sid: Sid,
    pub conn: Arc<dyn FieldProtocolClient>,
    pub cfg: ConnectionConfig,
    pub created_at: DateTime<Utc>,
    pub cancel: CancellationToken,
    state: AsyncRwLock<EntryMutable>,
}

impl SessionEntry {
    async fn mark_used(&self) {
        let mut s = self.state.write().await;
        s.last_used_at = Utc::now();
        s.use_count += 1;
    }

    pub async fn is_polled(&self) -> bool {
        self.state.read().await.is_polled
    }

    pub async fn set_polled(&self, polled: bool) {
        self.state.write().await.is_polled = polled;
    }

    pub async fn set_healthy(&self, healthy: bool) {
        self.state.write().await.is_healthy = healthy;
    }

    async fn idle_snapshot(&self) -> (DateTime<Utc>, u64) {
        let s = self.state.read().await;
        (s.last_used_at, s.use_count)
    }

    pub async fn snapshot(&self) -> EntryView {
        let s = self.state.read().await;
        EntryView {
            sid: self.sid,
            endpoint_url: self.cfg.endpoint_url().to_string(),
            manufacturer: self.cfg.manufacturer().to_string(),
            model: self.cfg.model().to_string(),
            created_at: self.created_at,
            last_used_at: s.last_used_at,
            use_count: s.use_count,
            is_healthy: s.is_healthy,
            is_polled: s.is_polled,
        }
    }
}

/// A point-in-time, lock-free-to-iterate copy of a `SessionEntry`, as
/// returned by `List()`.
#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
    pub sid: Sid,
    pub endpoint_url: String,
    pub manufacturer: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub use_count: u64,
    pub is_healthy: bool,
    pub is_polled: bool,
}

#[derive(Debug, Default)]
struct PoolCounters {
    total_connections: AtomicU64,
    failed_connections: AtomicU64,
    active_connections: AtomicU64,
    pool_size: AtomicU64,
}

/// §3 `PoolStats`: atomics, so `Stats()` never blocks behind the map lock.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PoolStatsSnapshot {
    pub total_connections: u64,
    pub failed_connections: u64,
    pub active_connections: u64,
    pub pool_size: u64,
}

pub struct SessionPool {
    entries: DashMap<Sid, Arc<SessionEntry>>,
    factory: Arc<dyn FieldProtocolClientFactory>,
    counters: PoolCounters,
    tuning: PoolTuning,
    /// Set once via `attach_polling_engine`, mirroring the teacher's
    /// `Pool::self_weak` pattern: a `Weak` back-reference so the pool can
    /// ask the polling engine to stop a poller during `Close` without the
    /// two halves owning each other.
    polling: OnceCell<Weak<PollingEngine>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("pool_size", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl SessionPool {
    pub fn new(factory: Arc<dyn FieldProtocolClientFactory>, tuning: PoolTuning) -> Self {
        Self {
            entries: DashMap::new(),
            factory,
            counters: PoolCounters::default(),
            tuning,
            polling: OnceCell::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Must be called once after wrapping the pool in an `Arc`, mirroring
    /// `Pool::attach_self` in the teacher.
    pub fn attach_polling_engine(&self, engine: &Arc<PollingEngine>) {
        let _ = self.polling.set(Arc::downgrade(engine));
    }

    /// `Create(cfg)`: dials via the factory, mints a fresh SID distinct
    /// from all live SIDs, and inserts the entry. Reuse is never decided
    /// here — that's the orchestrator's job (§4.3).
    pub async fn create(&self, cfg: ConnectionConfig) -> Result<(Sid, Arc<SessionEntry>)> {
        let opts = cfg.to_dial_options();
        let conn = match self.factory.dial(&opts).await {
            Ok(conn) => conn,
            Err(e) => {
                self.counters.failed_connections.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            },
        };

        let mut sid = Uuid::new_v4();
        while self.entries.contains_key(&sid) {
            sid = Uuid::new_v4();
        }

        let now = Utc::now();
        let entry = Arc::new(SessionEntry {
            sid,
            conn,
            cfg,
            created_at: now,
            cancel: CancellationToken::new(),
            state: AsyncRwLock::new(EntryMutable {
                last_used_at: now,
                use_count: 0,
                is_healthy: true,
                is_polled: false,
            }),
        });

        self.entries.insert(sid, entry.clone());
        self.counters.total_connections.fetch_add(1, Ordering::Relaxed);
        self.counters.active_connections.fetch_add(1, Ordering::Relaxed);
        self.counters.pool_size.fetch_add(1, Ordering::Relaxed);

        Ok((sid, entry))
    }

    /// `Get(sid)`: read-through accessor. `mark_used` records intent to use
    /// the handle; `strict_health` turns a failed last probe into
    /// `ErrUnhealthy` instead of silently handing back the entry (§7).
    pub async fn get(
        &self,
        sid: Sid,
        mark_used: bool,
        strict_health: bool,
    ) -> Result<Arc<SessionEntry>> {
        let entry = self
            .entries
            .get(&sid)
            .map(|e| e.value().clone())
            .ok_or_else(|| GatewayError::not_found("pool.get"))?;

        if mark_used {
            entry.mark_used().await;
        }

        if strict_health && !entry.state.read().await.is_healthy {
            return Err(GatewayError::unhealthy("pool.get"));
        }

        Ok(entry)
    }

    /// `Probe(sid)`: a minimal root-folder read with a 5 s (configurable)
    /// timeout. Never mutates pool state — the health worker applies the
    /// result.
    pub async fn probe(&self, sid: Sid) -> Result<bool> {
        let entry = self
            .entries
            .get(&sid)
            .map(|e| e.value().clone())
            .ok_or_else(|| GatewayError::not_found("pool.probe"))?;

        let outcome =
            tokio::time::timeout(self.tuning.probe_timeout, entry.conn.read(ROOT_FOLDER_NODE_ID))
                .await;
        Ok(matches!(outcome, Ok(Ok(_))))
    }

    /// `Close(sid)`: stops polling if active, cancels the entry's context,
    /// closes the transport under a deadline, removes the entry, and
    /// decrements counters. Idempotent after the first success — a second
    /// call observes `ErrNotFound`.
    pub async fn close(&self, sid: Sid) -> Result<()> {
        let Some((_, entry)) = self.entries.remove(&sid) else {
            return Err(GatewayError::not_found("pool.close"));
        };
        self.counters.active_connections.fetch_sub(1, Ordering::Relaxed);
        self.counters.pool_size.fetch_sub(1, Ordering::Relaxed);
        self.teardown(sid, &entry).await;
        Ok(())
    }

    /// `CloseAll()`: snapshots the set of entries, empties the map
    /// atomically, then closes each snapshot entry; individual close
    /// failures are logged, never aborting the sweep.
    pub async fn close_all(&self) {
        let snapshot: Vec<(Sid, Arc<SessionEntry>)> =
            self.entries.iter().map(|e| (*e.key(), e.value().clone())).collect();
        self.entries.clear();

        let n = snapshot.len() as u64;
        self.counters.active_connections.fetch_sub(n, Ordering::Relaxed);
        self.counters.pool_size.fetch_sub(n, Ordering::Relaxed);

        for (sid, entry) in snapshot {
            self.teardown(sid, &entry).await;
        }
    }

    /// `List()`: a snapshot safe to iterate after release.
    pub async fn list(&self) -> Vec<EntryView> {
        let handles: Vec<Arc<SessionEntry>> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(handles.len());
        for entry in handles {
            out.push(entry.snapshot().await);
        }
        out
    }

    /// `Stats()`: an atomic load of counters.
    pub fn stats(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            total_connections: self.counters.total_connections.load(Ordering::Relaxed),
            failed_connections: self.counters.failed_connections.load(Ordering::Relaxed),
            active_connections: self.counters.active_connections.load(Ordering::Relaxed),
            pool_size: self.counters.pool_size.load(Ordering::Relaxed),
        }
    }

    /// Spawns the health/idle-cleanup worker described in §4.2. Returns an
    /// explicit join handle (§9 design note: `Run`/`Shutdown`, not a
    /// package-level daemon).
    pub fn spawn_health_worker(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move { pool.health_worker_loop().await })
    }

    /// Signals the health worker to stop; it runs `CloseAll` on its way
    /// out.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn health_worker_loop(self: Arc<Self>) {
        let mut health_tick = tokio::time::interval(self.tuning.health_probe_interval);
        let mut idle_tick = tokio::time::interval(self.tuning.idle_cleanup_interval);
        health_tick.tick().await; // consume the immediate first tick
        idle_tick.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.close_all().await;
                    return;
                }
                _ = health_tick.tick() => {
                    self.run_health_probes().await;
                }
                _ = idle_tick.tick() => {
                    self.run_idle_cleanup().await;
                }
            }
        }
    }

    /// Every tick: probes only entries with `is_polled == true` (§4.2
    /// rationale — an idle session is left alone so restoration can retry
    /// lazily; a polled session that fails is evicted because the poller
    /// is already failing reads).
    async fn run_health_probes(&self) {
        let snapshot: Vec<(Sid, Arc<SessionEntry>)> =
            self.entries.iter().map(|e| (*e.key(), e.value().clone())).collect();
        for (sid, entry) in snapshot {
            if !entry.is_polled().await {
                continue;
            }
            let healthy = self.probe(sid).await.unwrap_or(false);
            entry.set_healthy(healthy).await;
            if !healthy {
                if let Err(e) = self.close(sid).await {
                    tracing::warn!(sid = %sid, error = %e, "eviction of unhealthy polled session failed");
                }
            }
        }
    }

    async fn run_idle_cleanup(&self) {
        let now = Utc::now();
        let threshold = chrono::Duration::from_std(self.tuning.idle_threshold)
            .unwrap_or_else(|_| chrono::Duration::seconds(600));

        let snapshot: Vec<(Sid, Arc<SessionEntry>)> =
            self.entries.iter().map(|e| (*e.key(), e.value().clone())).collect();
        for (sid, entry) in snapshot {
            let (last_used_at, use_count) = entry.idle_snapshot().await;
            if use_count == 0 && now.signed_duration_since(last_used_at) > threshold {
                if let Err(e) = self.close(sid).await {
                    tracing::warn!(sid = %sid, error = %e, "idle cleanup close failed");
                }
            }
        }
    }

    async fn teardown(&self, sid: Sid, entry: &Arc<SessionEntry>) {
        if let Some(engine) = self.polling.get().and_then(Weak::upgrade) {
            let _ = engine.stop(sid).await;
        }
        entry.cancel.cancel();

        match tokio::time::timeout(self.tuning.close_timeout, entry.conn.close()).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => tracing::warn!(sid = %sid, error = %e, "transport close failed"),
            Err(_) => tracing::warn!(sid = %sid, "transport close timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::transport::simulated::SimulatedFieldProtocolClientFactory;

    fn tuning() -> PoolTuning {
        PoolTuning {
            health_probe_interval: Duration::from_secs(60),
            idle_cleanup_interval: Duration::from_secs(300),
            idle_threshold: Duration::from_secs(600),
            probe_timeout: Duration::from_secs(5),
            close_timeout: Duration::from_secs(3),
            reachability_timeout: Duration::from_secs(5),
        }
    }

    fn anon_cfg(endpoint: &str) -> ConnectionConfig {
        ConnectionConfig::Anon {
            endpoint: endpoint.to_string(),
            timeout: Duration::from_secs(1),
            manufacturer: "heidenhain".to_string(),
            model: "tnc640".to_string(),
        }
    }

    fn pool() -> SessionPool {
        SessionPool::new(Arc::new(SimulatedFieldProtocolClientFactory), tuning())
    }

    #[tokio::test]
    async fn create_mints_distinct_sids_and_updates_stats() {
        let pool = pool();
        let (sid_a, _) = pool.create(anon_cfg("opc.tcp://a:4840")).await.expect("test assertion");
        let (sid_b, _) = pool.create(anon_cfg("opc.tcp://b:4840")).await.expect("test assertion");
        assert_ne!(sid_a, sid_b);
        let stats = pool.stats();
        assert_eq!(stats.pool_size, 2);
        assert_eq!(stats.active_connections, 2);
        assert_eq!(stats.total_connections, 2);
    }

    #[tokio::test]
    async fn failed_dial_increments_failed_connections_only() {
        let pool = pool();
        let err = pool.create(anon_cfg("opc.tcp://192.0.2.1:4840")).await.expect_err("test assertion");
        assert!(matches!(err, GatewayError::Unreachable { .. }));
        let stats = pool.stats();
        assert_eq!(stats.failed_connections, 1);
        assert_eq!(stats.pool_size, 0);
    }

    #[tokio::test]
    async fn close_is_idempotent_after_first_success() {
        let pool = pool();
        let (sid, _) = pool.create(anon_cfg("opc.tcp://a:4840")).await.expect("test assertion");
        pool.close(sid).await.expect("test assertion");
        let err = pool.close(sid).await.expect_err("test assertion");
        assert!(matches!(err, GatewayError::NotFound { .. }));
        assert_eq!(pool.stats().pool_size, 0);
    }

    #[tokio::test]
    async fn get_after_close_is_not_found() {
        let pool = pool();
        let (sid, _) = pool.create(anon_cfg("opc.tcp://a:4840")).await.expect("test assertion");
        pool.close(sid).await.expect("test assertion");
        let err = pool.get(sid, false, false).await.expect_err("test assertion");
        assert!(matches!(err, GatewayError::NotFound { .. }));
    }

    #[tokio::test]
    async fn close_all_tears_down_every_entry() {
        let pool = pool();
        pool.create(anon_cfg("opc.tcp://a:4840")).await.expect("test assertion");
        pool.create(anon_cfg("opc.tcp://b:4840")).await.expect("test assertion");
        pool.close_all().await;
        let stats = pool.stats();
        assert_eq!(stats.pool_size, 0);
        assert_eq!(stats.active_connections, 0);
        assert!(pool.list().await.is_empty());
    }

    #[tokio::test]
    async fn probe_succeeds_against_the_simulated_root_node() {
        let pool = pool();
        let (sid, _) = pool.create(anon_cfg("opc.tcp://a:4840")).await.expect("test assertion");
        assert!(pool.probe(sid).await.expect("test assertion"));
    }

    /// A non-polled session is left alone by the health tick even if its
    /// transport would fail a probe; only idle-cleanup (time-based) can
    /// evict it.
    #[tokio::test]
    async fn health_probes_skip_non_polled_entries() {
        let pool = pool();
        let (sid, _) = pool.create(anon_cfg("opc.tcp://a:4840")).await.expect("test assertion");

        pool.run_health_probes().await;

        assert_eq!(pool.stats().pool_size, 1);
        assert!(pool.get(sid, false, false).await.is_ok());
    }

    #[tokio::test]
    async fn health_probes_evict_a_polled_entry_whose_transport_is_closed() {
        let pool = pool();
        let (sid, entry) = pool.create(anon_cfg("opc.tcp://a:4840")).await.expect("test assertion");
        entry.set_polled(true).await;
        entry.conn.close().await.expect("test assertion");

        pool.run_health_probes().await;

        assert_eq!(pool.stats().pool_size, 0);
        assert!(pool.get(sid, false, false).await.is_err());
    }
}
