//! Real-broker `EventBus` behind the `kafka` feature, using the same
//! `rdkafka` producer the corpus's other gateway-style services reach for.

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::{
    ClientConfig,
    producer::{FutureProducer, FutureRecord},
};

use crate::{bus::EventBus, error::GatewayError, error::Result};

const OP: &str = "bus.kafka.publish";

pub struct KafkaEventBus {
    producer: FutureProducer,
    topic: String,
}

impl std::fmt::Debug for KafkaEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaEventBus")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl KafkaEventBus {
    pub fn new(brokers: &[String], topic: String) -> Result<Self> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", brokers.join(","))
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| GatewayError::internal(OP, e))?;
        Ok(Self { producer, topic })
    }
}

#[async_trait]
impl EventBus for KafkaEventBus {
    async fn publish(&self, key: Vec<u8>, payload: Vec<u8>) -> Result<()> {
        let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);
        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| GatewayError::internal(OP, e))?;
        Ok(())
    }
}
