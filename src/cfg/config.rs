// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

/// Top-level configuration: a YAML file carries the pool-tuning defaults,
/// environment variables carry the deployment-specific ambient settings
/// named in §6 (`SERVER_PORT`, `DATABASE_*`, `EVENT_BUS_*`, `LOG_*`).
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub event_bus: EventBusConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub pool: PoolTuning,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig { port: 8080 }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            name: "cnc_gateway".to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventBusKind {
    /// Drops every record; used by tests and as the safe default.
    Null,
    /// Writes each record as a line of JSON to stdout.
    Stdout,
    /// Publishes to a real broker. Requires the `kafka` feature.
    Kafka,
}

impl Default for EventBusKind {
    fn default() -> Self {
        EventBusKind::Null
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct EventBusConfig {
    #[serde(default)]
    pub kind: EventBusKind,
    #[serde(default)]
    pub brokers: Vec<String>,
    #[serde(default)]
    pub topic: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LoggingConfig {
    /// Directory log files are rotated into; `None` logs to stdout.
    pub dir: Option<String>,
    /// `tracing_subscriber::EnvFilter`-compatible level string, e.g. "info".
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            dir: None,
            level: "info".to_string(),
        }
    }
}

/// The §4.2 health-worker intervals, made configurable rather than
/// hard-coded so a deployer can retune them without touching the pool.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct PoolTuning {
    #[serde(with = "serde_secs")]
    pub health_probe_interval: Duration,
    #[serde(with = "serde_secs")]
    pub idle_cleanup_interval: Duration,
    #[serde(with = "serde_secs")]
    pub idle_threshold: Duration,
    #[serde(with = "serde_secs")]
    pub probe_timeout: Duration,
    #[serde(with = "serde_secs")]
    pub close_timeout: Duration,
    #[serde(with = "serde_secs")]
    pub reachability_timeout: Duration,
}

impl Default for PoolTuning {
    fn default() -> Self {
        PoolTuning {
            health_probe_interval: Duration::from_secs(60),
            idle_cleanup_interval: Duration::from_secs(5 * 60),
            idle_threshold: Duration::from_secs(10 * 60),
            probe_timeout: Duration::from_secs(5),
            close_timeout: Duration::from_secs(3),
            reachability_timeout: Duration::from_secs(5),
        }
    }
}

impl GatewayConfig {
    /// Loads pool-tuning defaults (and anything else present) from a YAML
    /// file, then overlays the ambient, deployment-specific environment
    /// variables of §6 on top.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path).context("failed to read config file")?;
        let mut cfg: GatewayConfig =
            serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.overlay_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Builds a default configuration and overlays environment variables;
    /// used when no config file is supplied.
    pub fn from_env() -> Result<Self> {
        let mut cfg = GatewayConfig {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            event_bus: EventBusConfig::default(),
            logging: LoggingConfig::default(),
            pool: PoolTuning::default(),
        };
        cfg.overlay_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn overlay_env(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var("SERVER_PORT") {
            self.server.port = v.parse().context("SERVER_PORT must be a u16")?;
        }
        if let Ok(v) = std::env::var("DATABASE_HOST") {
            self.database.host = v;
        }
        if let Ok(v) = std::env::var("DATABASE_PORT") {
            self.database.port = v.parse().context("DATABASE_PORT must be a u16")?;
        }
        if let Ok(v) = std::env::var("DATABASE_USER") {
            self.database.user = v;
        }
        if let Ok(v) = std::env::var("DATABASE_PASSWORD") {
            self.database.password = v;
        }
        if let Ok(v) = std::env::var("DATABASE_NAME") {
            self.database.name = v;
        }
        if let Ok(v) = std::env::var("EVENT_BUS_BROKERS") {
            self.event_bus.brokers =
                v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(v) = std::env::var("EVENT_BUS_TOPIC") {
            self.event_bus.topic = v;
        }
        if let Ok(v) = std::env::var("LOG_DIR") {
            self.logging.dir = Some(v);
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.logging.level = v;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.server.port != 0, "SERVER_PORT must be nonzero");
        ensure!(
            !self.pool.health_probe_interval.is_zero(),
            "pool.health_probe_interval must be nonzero"
        );
        ensure!(
            !self.pool.idle_cleanup_interval.is_zero(),
            "pool.idle_cleanup_interval must be nonzero"
        );
        Ok(())
    }
}

/// Serde helper representing `Duration` as a number of seconds, matching
/// the timer fields of the teacher's iSCSI config.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let cfg = GatewayConfig {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            event_bus: EventBusConfig::default(),
            logging: LoggingConfig::default(),
            pool: PoolTuning::default(),
        };
        cfg.validate().expect("defaults must validate");
    }

    #[test]
    fn database_url_is_well_formed() {
        let db = DatabaseConfig {
            host: "db".to_string(),
            port: 5432,
            user: "u".to_string(),
            password: "p".to_string(),
            name: "n".to_string(),
        };
        assert_eq!(db.connection_url(), "postgres://u:p@db:5432/n");
    }
}
