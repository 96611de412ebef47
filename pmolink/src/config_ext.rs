//! Extension pour intégrer la configuration du transport dans pmoconfig

use crate::link::LinkOptions;
use pmoconfig::Config;
use pmowire::Role;
use serde_yaml::Value;
use std::time::Duration;

const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 25_000;
const DEFAULT_RECONNECT_INITIAL_MS: u64 = 1_000;
const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;

/// Trait d'extension pour la configuration du transport client
pub trait LinkConfigExt {
    /// Cadence du heartbeat client (défaut 25 000 ms)
    fn get_heartbeat_interval_ms(&self) -> u64;

    /// Premier délai de reconnexion (défaut 1 000 ms)
    fn get_reconnect_initial_ms(&self) -> u64;

    /// Plafond du délai de reconnexion (défaut 30 000 ms)
    fn get_reconnect_max_ms(&self) -> u64;
}

fn u64_or(value: Result<Value, anyhow::Error>, default: u64) -> u64 {
    match value {
        Ok(Value::Number(n)) if n.is_u64() => n.as_u64().unwrap(),
        _ => default,
    }
}

impl LinkConfigExt for Config {
    fn get_heartbeat_interval_ms(&self) -> u64 {
        u64_or(
            self.get_value(&["link", "heartbeat_interval_ms"]),
            DEFAULT_HEARTBEAT_INTERVAL_MS,
        )
    }

    fn get_reconnect_initial_ms(&self) -> u64 {
        u64_or(
            self.get_value(&["link", "reconnect_initial_ms"]),
            DEFAULT_RECONNECT_INITIAL_MS,
        )
    }

    fn get_reconnect_max_ms(&self) -> u64 {
        u64_or(
            self.get_value(&["link", "reconnect_max_ms"]),
            DEFAULT_RECONNECT_MAX_MS,
        )
    }
}

impl LinkOptions {
    /// Construit les options du transport depuis pmoconfig
    pub fn from_config(
        config: &Config,
        url: impl Into<String>,
        room_id: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(config.get_heartbeat_interval_ms()),
            reconnect_initial: Duration::from_millis(config.get_reconnect_initial_ms()),
            reconnect_max: Duration::from_millis(config.get_reconnect_max_ms()),
            ..Self::new(url, room_id, role)
        }
    }
}
