//! The Polling Engine of §4.4: per-session cooperative pollers that read a
//! model-specific node set on an interval, decode the values into a
//! canonical record, and publish it to the event bus. Grounded on the
//! teacher's `ClientConnection` cancellation style (`CancellationToken`
//! per live handle, `tokio::select!` against it at every suspension
//! point) generalized from one reader loop per TCP connection to one
//! ticker per polled session.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    bus::EventBus,
    cfg::enums::MachineStatus,
    codec::machine_data_factory,
    error::{GatewayError, Result},
    pool::{Sid, SessionEntry, SessionPool},
    registry::Registry,
};

struct PollTask {
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

/// Owns the SID → cancel-token map (§5: guarded by its own mutex, never
/// acquired while holding the pool's map lock). Refers to sessions only by
/// SID — the pool is the sole owner of `SessionEntry` state (§9).
pub struct PollingEngine {
    pool: Arc<SessionPool>,
    bus: Arc<dyn EventBus>,
    registry: Arc<dyn Registry>,
    tasks: Mutex<HashMap<Sid, PollTask>>,
}

impl std::fmt::Debug for PollingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingEngine").finish_non_exhaustive()
    }
}

impl PollingEngine {
    pub fn new(pool: Arc<SessionPool>, bus: Arc<dyn EventBus>, registry: Arc<dyn Registry>) -> Self {
        Self {
            pool,
            bus,
            registry,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// `Start(sid)`: must be `IDLE`; spawns a ticker task at `cfg.timeout`
    /// interval. Starting an already-polling SID is an error. Persists
    /// `status = POLLED` on the machine row first, mirroring the original
    /// `StartPollingMachine`'s `UpdateCncMachine` call, so `RestoreAll` can
    /// tell which rows to resume polling for after a restart.
    pub async fn start(self: &Arc<Self>, sid: Sid) -> Result<()> {
        let entry = self.pool.get(sid, false, false).await?;

        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&sid) {
            return Err(GatewayError::validation(
                "polling.start",
                "session is already being polled",
            ));
        }

        self.registry
            .update_machine_status(sid, MachineStatus::Polled)
            .await
            .map_err(|e| GatewayError::persist("polling.start.update_status", e))?;

        entry.set_polled(true).await;

        let interval = entry.cfg.timeout();
        let manufacturer = entry.cfg.manufacturer().to_string();
        let model = entry.cfg.model().to_string();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let engine = Arc::clone(self);

        let handle = tokio::spawn(async move {
            engine.run_ticks(sid, entry, interval, manufacturer, model, task_cancel).await;
        });

        tasks.insert(sid, PollTask { cancel, handle });
        Ok(())
    }

    /// `Stop(sid)`: must be `POLLING`; cancels the token and waits for the
    /// ticker to observe it. Idempotent after the first success — a second
    /// call observes `ErrNotFound` per the state machine's `IDLE` terminal
    /// state. Persists `status = CONNECTED` back on the machine row,
    /// mirroring the original `StopPollingMachine`, so a stopped machine
    /// isn't re-polled on the next restart.
    pub async fn stop(&self, sid: Sid) -> Result<()> {
        let task = {
            let mut tasks = self.tasks.lock().await;
            tasks.remove(&sid).ok_or_else(|| GatewayError::not_found("polling.stop"))?
        };

        task.cancel.cancel();
        let _ = task.handle.await;

        if let Ok(entry) = self.pool.get(sid, false, false).await {
            entry.set_polled(false).await;
        }

        self.registry
            .update_machine_status(sid, MachineStatus::Connected)
            .await
            .map_err(|e| GatewayError::persist("polling.stop.update_status", e))?;

        Ok(())
    }

    /// Whether a poller is currently registered for `sid`.
    pub async fn is_active(&self, sid: Sid) -> bool {
        self.tasks.lock().await.contains_key(&sid)
    }

    async fn run_ticks(
        self: Arc<Self>,
        sid: Sid,
        entry: Arc<SessionEntry>,
        interval: Duration,
        manufacturer: String,
        model: String,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut warned_unsupported = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {},
            }

            self.run_one_tick(sid, &entry, &manufacturer, &model, &cancel, &mut warned_unsupported)
                .await;
        }
    }

    /// One tick of §4.4 steps 1-5: resolve the codec, read every relevant
    /// node, decode, serialize, and publish. Read and decode failures are
    /// logged and skipped — the tick always runs to completion over the
    /// node list rather than aborting on the first bad node.
    async fn run_one_tick(
        &self,
        sid: Sid,
        entry: &Arc<SessionEntry>,
        manufacturer: &str,
        model: &str,
        cancel: &CancellationToken,
        warned_unsupported: &mut bool,
    ) {
        let Some(mut codec) = machine_data_factory(manufacturer, model) else {
            if !*warned_unsupported {
                tracing::warn!(
                    sid = %sid,
                    manufacturer,
                    model,
                    "no machine-data codec for this (manufacturer, model) pair; skipping ticks"
                );
                *warned_unsupported = true;
            }
            return;
        };

        for node_id in codec.relevant_node_ids() {
            if cancel.is_cancelled() {
                return;
            }

            let read = tokio::select! {
                _ = cancel.cancelled() => return,
                res = entry.conn.read(node_id) => res,
            };

            match read {
                Ok(value) => {
                    if let Err(e) = codec.decode(node_id, value) {
                        tracing::warn!(sid = %sid, node_id, error = %e, "decode failed; skipping node");
                    }
                },
                Err(e) => {
                    tracing::warn!(sid = %sid, node_id, error = %e, "read failed; skipping node");
                },
            }
        }

        let record = codec.to_response();
        let payload = match serde_json::to_vec(&record) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(sid = %sid, error = %e, "failed to serialize canonical record");
                return;
            },
        };
        let key = codec.serial_number().into_bytes();

        if let Err(e) = self.bus.publish(key, payload).await {
            tracing::warn!(sid = %sid, error = %e, "publish failed; tick is not retried");
        }
    }
}
