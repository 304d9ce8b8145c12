//! The Event Bus collaborator of §4.8 / §6: `Publish(key, payload) → error`.
//! `NullEventBus` is the safe default for tests; `StdoutEventBus` and
//! `RecordingEventBus` exist for local runs and integration tests
//! respectively; a real broker sits behind the `kafka` feature.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

#[cfg(feature = "kafka")]
pub mod kafka;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;

/// The downstream pub/sub sink every poller tick publishes to. `key` is the
/// machine's reported serial number (or empty, §4.4 step 5); `payload` is
/// the canonical JSON record.
#[async_trait]
pub trait EventBus: Send + Sync + std::fmt::Debug {
    async fn publish(&self, key: Vec<u8>, payload: Vec<u8>) -> Result<()>;
}

/// Drops every record; always succeeds. Default for unit tests that don't
/// care about what reaches the bus.
#[derive(Debug, Default)]
pub struct NullEventBus;

#[async_trait]
impl EventBus for NullEventBus {
    async fn publish(&self, _key: Vec<u8>, _payload: Vec<u8>) -> Result<()> {
        Ok(())
    }
}

/// Writes each published record as a line of JSON to stdout. Useful for
/// demoing the poller against the simulated transport without a broker.
#[derive(Debug, Default)]
pub struct StdoutEventBus;

#[async_trait]
impl EventBus for StdoutEventBus {
    async fn publish(&self, key: Vec<u8>, payload: Vec<u8>) -> Result<()> {
        let key = String::from_utf8_lossy(&key);
        let payload = String::from_utf8_lossy(&payload);
        println!("{{\"key\":{key:?},\"payload\":{payload}}}");
        Ok(())
    }
}

/// Records every publish in memory so an integration test can assert on the
/// (key, payload) pairs a poller tick produced (§8 scenario 4).
#[derive(Debug, Default)]
pub struct RecordingEventBus {
    published: Mutex<Vec<(Vec<u8>, Vec<u8>)>>,
}

impl RecordingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.published.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.published.lock().await.len()
    }
}

#[async_trait]
impl EventBus for RecordingEventBus {
    async fn publish(&self, key: Vec<u8>, payload: Vec<u8>) -> Result<()> {
        self.published.lock().await.push((key, payload));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_bus_accumulates_publishes() {
        let bus = RecordingEventBus::new();
        bus.publish(b"sn-1".to_vec(), b"{}".to_vec()).await.expect("test assertion");
        bus.publish(b"sn-1".to_vec(), b"{}".to_vec()).await.expect("test assertion");
        assert_eq!(bus.len().await, 2);
        let snapshot = bus.snapshot().await;
        assert_eq!(snapshot[0].0, b"sn-1");
    }

    #[tokio::test]
    async fn null_bus_always_succeeds() {
        let bus = NullEventBus;
        bus.publish(Vec::new(), Vec::new()).await.expect("test assertion");
    }
}
