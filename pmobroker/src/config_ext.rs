//! Extension pour intégrer la configuration du broker dans pmoconfig

use crate::broker::BrokerOptions;
use pmoconfig::Config;
use serde_yaml::Value;
use std::time::Duration;

const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 30_000;

/// Trait d'extension pour la configuration du broker
pub trait BrokerConfigExt {
    /// Fenêtre de vie d'une connexion sans trame (défaut 30 000 ms)
    fn get_heartbeat_timeout_ms(&self) -> u64;
}

impl BrokerConfigExt for Config {
    fn get_heartbeat_timeout_ms(&self) -> u64 {
        match self.get_value(&["broker", "heartbeat_timeout_ms"]) {
            Ok(Value::Number(n)) if n.is_u64() => n.as_u64().unwrap(),
            _ => DEFAULT_HEARTBEAT_TIMEOUT_MS,
        }
    }
}

impl BrokerOptions {
    /// Construit les options du broker depuis pmoconfig
    pub fn from_config(config: &Config) -> Self {
        Self {
            heartbeat_timeout: Duration::from_millis(config.get_heartbeat_timeout_ms()),
            ..Self::default()
        }
    }
}
