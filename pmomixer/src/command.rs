//! Messages du thread de contrôle vers le thread audio
//!
//! Le seul canal d'entrée du domaine audio. Les PCM voyagent par transfert
//! de propriété (le contrôle ne garde aucune référence après envoi) ; le
//! callback draine la file entre deux blocs avec `try_recv`, jamais en
//! bloquant.

use crate::sample::SamplePcm;
use std::sync::Arc;

/// Commandes acceptées par le mixeur
#[derive(Debug)]
pub enum MixerCommand {
    /// Installe un PCM décodé (remplace l'entrée existante du même id)
    LoadSample {
        sound_id: Arc<str>,
        pcm: SamplePcm,
    },

    /// Retire un PCM ; les voix liées passent en release
    UnloadSample { sound_id: Arc<str> },

    /// Alloue une voix et démarre la lecture
    Trigger { sound_id: Arc<str> },

    /// Toutes les voix actives passent en release
    StopAll,
}
