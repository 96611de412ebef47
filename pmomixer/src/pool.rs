//! Pool de voix à capacité fixe
//!
//! Le pool est dimensionné une fois à la construction et ne réalloue
//! jamais : CPU borné, zéro allocation après démarrage. Quand toutes les
//! voix sont occupées, le déclenchement vole un slot selon une politique
//! déterministe plutôt que d'échouer.

use crate::voice::Voice;
use std::str::FromStr;

/// Capacité par défaut du pool
pub const DEFAULT_POLYPHONY: usize = 32;

/// Politique de vol de voix quand le pool est plein
///
/// - `Oldest` : la voix au curseur le plus avancé (la plus ancienne encore
///   en lecture). Déterministe et reproductible.
/// - `Quietest` : la voix au niveau d'enveloppe le plus bas. Reprises plus
///   douces, au prix d'un scan des niveaux à chaque déclenchement.
///
/// Dans les deux cas, l'égalité se résout par l'index le plus bas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StealPolicy {
    #[default]
    Oldest,
    Quietest,
}

impl FromStr for StealPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "oldest" => Ok(StealPolicy::Oldest),
            "quietest" => Ok(StealPolicy::Quietest),
            other => Err(format!("unknown voice stealing policy: {other}")),
        }
    }
}

/// Tableau pré-alloué de [`Voice`]
#[derive(Debug)]
pub struct VoicePool {
    voices: Vec<Voice>,
    policy: StealPolicy,
}

impl VoicePool {
    pub fn new(capacity: usize, policy: StealPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            voices: vec![Voice::idle(); capacity],
            policy,
        }
    }

    /// Sélectionne un slot pour un nouveau déclenchement
    ///
    /// 1. Premier slot libre si disponible.
    /// 2. Sinon, vol selon la politique du pool.
    ///
    /// Retourne toujours un index : un déclenchement n'échoue jamais par
    /// épuisement du pool.
    pub fn allocate(&mut self) -> usize {
        if let Some(index) = self.voices.iter().position(|voice| !voice.is_active()) {
            return index;
        }
        self.steal_index()
    }

    /// Choisit la victime quand toutes les voix sont actives
    fn steal_index(&self) -> usize {
        let mut best = 0;
        match self.policy {
            StealPolicy::Oldest => {
                let mut best_cursor = self.voices[0].cursor();
                for (index, voice) in self.voices.iter().enumerate().skip(1) {
                    // Strictement supérieur : à égalité, l'index le plus bas gagne.
                    if voice.cursor() > best_cursor {
                        best = index;
                        best_cursor = voice.cursor();
                    }
                }
            }
            StealPolicy::Quietest => {
                let mut best_level = self.voices[0].env_level();
                for (index, voice) in self.voices.iter().enumerate().skip(1) {
                    if voice.env_level() < best_level {
                        best = index;
                        best_level = voice.env_level();
                    }
                }
            }
        }
        best
    }

    /// Met toutes les voix actives en release (stop-all)
    pub fn release_all(&mut self) {
        for voice in &mut self.voices {
            voice.begin_release();
        }
    }

    /// Met en release les voix liées à un son (déchargement)
    pub fn release_sound(&mut self, sound_id: &str) {
        for voice in &mut self.voices {
            if voice.sound_id() == Some(sound_id) {
                voice.begin_release();
            }
        }
    }

    pub fn voice_mut(&mut self, index: usize) -> &mut Voice {
        &mut self.voices[index]
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn voices_mut(&mut self) -> &mut [Voice] {
        &mut self.voices
    }

    pub fn capacity(&self) -> usize {
        self.voices.len()
    }

    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|voice| voice.is_active()).count()
    }

    pub fn policy(&self) -> StealPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SamplePcm;
    use std::sync::Arc;

    fn pcm() -> Arc<SamplePcm> {
        Arc::new(SamplePcm::mono(vec![0.5; 1024]))
    }

    fn full_pool(policy: StealPolicy) -> VoicePool {
        let mut pool = VoicePool::new(4, policy);
        for i in 0..4 {
            let index = pool.allocate();
            pool.voice_mut(index)
                .start(format!("sound-{i}").into(), pcm());
        }
        pool
    }

    #[test]
    fn test_idle_first_allocation() {
        let mut pool = VoicePool::new(4, StealPolicy::Oldest);
        assert_eq!(pool.allocate(), 0);
        pool.voice_mut(0).start("a".into(), pcm());
        assert_eq!(pool.allocate(), 1);
    }

    #[test]
    fn test_oldest_steals_largest_cursor() {
        let mut pool = full_pool(StealPolicy::Oldest);
        // La voix 2 est la plus avancée dans son sample.
        for _ in 0..10 {
            pool.voice_mut(2).advance();
        }
        for _ in 0..5 {
            pool.voice_mut(1).advance();
        }

        assert_eq!(pool.allocate(), 2);
    }

    #[test]
    fn test_oldest_tie_breaks_on_lowest_index() {
        let mut pool = full_pool(StealPolicy::Oldest);
        // Tous les curseurs égaux : l'index 0 doit gagner.
        assert_eq!(pool.allocate(), 0);
    }

    #[test]
    fn test_quietest_steals_lowest_envelope() {
        let mut pool = full_pool(StealPolicy::Quietest);
        // Faire monter toutes les enveloppes sauf la voix 3.
        for index in 0..3 {
            for _ in 0..100 {
                pool.voice_mut(index).step_envelope(0.1, 0.1);
            }
        }
        pool.voice_mut(3).step_envelope(0.01, 0.1);

        assert_eq!(pool.allocate(), 3);
    }

    #[test]
    fn test_polyphony_bound_holds() {
        let mut pool = full_pool(StealPolicy::Oldest);
        for i in 0..20 {
            let index = pool.allocate();
            pool.voice_mut(index)
                .start(format!("extra-{i}").into(), pcm());
            assert!(pool.active_count() <= pool.capacity());
        }
        assert_eq!(pool.active_count(), 4);
    }

    #[test]
    fn test_release_sound_targets_only_bound_voices() {
        let mut pool = full_pool(StealPolicy::Oldest);
        pool.release_sound("sound-1");

        let stages: Vec<_> = pool.voices().iter().map(|v| v.stage()).collect();
        assert_eq!(stages[1], crate::voice::VoiceStage::Release);
        assert_ne!(stages[0], crate::voice::VoiceStage::Release);
    }
}
