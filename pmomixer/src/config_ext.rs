//! Extension pour intégrer la configuration du mixeur dans pmoconfig
//!
//! Ce module fournit le trait `MixerConfigExt` qui ajoute les accesseurs
//! de la section `pads:` à `pmoconfig::Config`.

use crate::mixer::MixerConfig;
use crate::pool::{StealPolicy, DEFAULT_POLYPHONY};
use pmoconfig::Config;
use serde_yaml::Value;

const DEFAULT_ATTACK_MS: f32 = 2.0;
const DEFAULT_RELEASE_MS: f32 = 3.0;

/// Trait d'extension pour la configuration du mixeur
///
/// # Exemple
///
/// ```rust,ignore
/// use pmoconfig::get_config;
/// use pmomixer::MixerConfigExt;
///
/// let config = get_config();
/// let polyphony = config.get_max_polyphony();
/// ```
pub trait MixerConfigExt {
    /// Taille du pool de voix (défaut 32)
    fn get_max_polyphony(&self) -> usize;

    /// Durée d'attaque en millisecondes (défaut 2)
    fn get_attack_ms(&self) -> f32;

    /// Durée de release en millisecondes (défaut 3)
    fn get_release_ms(&self) -> f32;

    /// Politique de vol de voix (défaut `oldest`)
    fn get_voice_stealing(&self) -> StealPolicy;
}

fn number_or(value: Result<Value, anyhow::Error>, default: f32) -> f32 {
    match value {
        Ok(Value::Number(n)) => n.as_f64().map(|v| v as f32).unwrap_or(default),
        _ => default,
    }
}

impl MixerConfigExt for Config {
    fn get_max_polyphony(&self) -> usize {
        match self.get_value(&["pads", "max_polyphony"]) {
            Ok(Value::Number(n)) if n.is_u64() => n.as_u64().unwrap() as usize,
            Ok(Value::Number(n)) if n.is_i64() => n.as_i64().unwrap().max(1) as usize,
            _ => DEFAULT_POLYPHONY,
        }
    }

    fn get_attack_ms(&self) -> f32 {
        number_or(self.get_value(&["pads", "attack_ms"]), DEFAULT_ATTACK_MS)
    }

    fn get_release_ms(&self) -> f32 {
        number_or(self.get_value(&["pads", "release_ms"]), DEFAULT_RELEASE_MS)
    }

    fn get_voice_stealing(&self) -> StealPolicy {
        match self.get_value(&["pads", "voice_stealing"]) {
            Ok(Value::String(s)) => s.parse().unwrap_or_else(|_| {
                tracing::warn!("Unknown voice stealing policy '{}', using oldest", s);
                StealPolicy::Oldest
            }),
            _ => StealPolicy::Oldest,
        }
    }
}

impl MixerConfig {
    /// Construit la configuration du mixeur depuis pmoconfig
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_polyphony: config.get_max_polyphony(),
            attack_ms: config.get_attack_ms(),
            release_ms: config.get_release_ms(),
            steal_policy: config.get_voice_stealing(),
        }
    }
}
