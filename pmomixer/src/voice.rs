//! Une voix : une lecture en cours d'un sample
//!
//! Les voix appartiennent exclusivement au callback audio. Elles sont
//! créées une fois à la construction du pool et réutilisées pour toute la
//! vie du processus ; aucun champ n'alloue lors d'un redéclenchement
//! (les identifiants circulent en `Arc<str>`).

use crate::sample::SamplePcm;
use std::sync::Arc;

/// Cycle de vie d'une voix
///
/// idle → attack au déclenchement ; attack → sustain quand l'enveloppe
/// atteint 1 ; sustain → release en fin de sample ou sur stop explicite ;
/// release → idle quand l'enveloppe retombe à 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceStage {
    Idle,
    Attack,
    Sustain,
    Release,
}

/// État mutable d'un slot de lecture
#[derive(Debug, Clone)]
pub struct Voice {
    active: bool,
    sound_id: Option<Arc<str>>,
    sample: Option<Arc<SamplePcm>>,
    cursor: usize,
    stage: VoiceStage,
    env_level: f32,
    release_start_cursor: usize,
}

impl Voice {
    pub(crate) fn idle() -> Self {
        Self {
            active: false,
            sound_id: None,
            sample: None,
            cursor: 0,
            stage: VoiceStage::Idle,
            env_level: 0.0,
            release_start_cursor: 0,
        }
    }

    /// Démarre (ou vole) le slot pour un nouveau son
    ///
    /// L'attaque repart de 0, ce qui rend le vol de voix inaudible : pas de
    /// discontinuité entre l'ancien contenu et le nouveau.
    pub fn start(&mut self, sound_id: Arc<str>, sample: Arc<SamplePcm>) {
        self.active = true;
        self.sound_id = Some(sound_id);
        self.sample = Some(sample);
        self.cursor = 0;
        self.stage = VoiceStage::Attack;
        self.env_level = 0.0;
        self.release_start_cursor = 0;
    }

    /// Passe la voix en release (fin de sample ou stop explicite)
    pub fn begin_release(&mut self) {
        if self.active && self.stage != VoiceStage::Release {
            self.stage = VoiceStage::Release;
            self.release_start_cursor = self.cursor;
        }
    }

    /// Rend le slot au pool
    pub fn reset(&mut self) {
        self.active = false;
        self.sound_id = None;
        self.sample = None;
        self.cursor = 0;
        self.stage = VoiceStage::Idle;
        self.env_level = 0.0;
    }

    /// Avance l'enveloppe d'une frame et retourne le niveau à appliquer
    ///
    /// En fin de release la voix se libère elle-même (retour à idle).
    pub fn step_envelope(&mut self, attack_inc: f32, release_inc: f32) -> f32 {
        match self.stage {
            VoiceStage::Idle => 0.0,
            VoiceStage::Attack => {
                self.env_level += attack_inc;
                if self.env_level >= 1.0 {
                    self.env_level = 1.0;
                    self.stage = VoiceStage::Sustain;
                }
                self.env_level
            }
            VoiceStage::Sustain => {
                self.env_level = 1.0;
                1.0
            }
            VoiceStage::Release => {
                self.env_level -= release_inc;
                if self.env_level <= 0.0 {
                    self.env_level = 0.0;
                    self.reset();
                    0.0
                } else {
                    self.env_level
                }
            }
        }
    }

    /// Avance le curseur de lecture d'une frame
    pub fn advance(&mut self) {
        self.cursor = self.cursor.saturating_add(1);
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn stage(&self) -> VoiceStage {
        self.stage
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn env_level(&self) -> f32 {
        self.env_level
    }

    pub fn release_start_cursor(&self) -> usize {
        self.release_start_cursor
    }

    pub fn sound_id(&self) -> Option<&str> {
        self.sound_id.as_deref()
    }

    pub(crate) fn sample(&self) -> Option<Arc<SamplePcm>> {
        self.sample.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started_voice() -> Voice {
        let mut voice = Voice::idle();
        voice.start("kick".into(), Arc::new(SamplePcm::mono(vec![0.5; 64])));
        voice
    }

    #[test]
    fn test_attack_ramps_monotonically_to_sustain() {
        let mut voice = started_voice();
        let attack_inc = 0.25;

        let mut previous = 0.0;
        for _ in 0..4 {
            let level = voice.step_envelope(attack_inc, 0.1);
            assert!(level >= previous, "attack must be non-decreasing");
            previous = level;
        }
        assert_eq!(voice.stage(), VoiceStage::Sustain);
        assert_eq!(voice.env_level(), 1.0);
    }

    #[test]
    fn test_release_ramps_down_then_frees_slot() {
        let mut voice = started_voice();
        // Monter jusqu'au sustain
        while voice.stage() != VoiceStage::Sustain {
            voice.step_envelope(0.5, 0.25);
        }

        voice.begin_release();
        let mut previous = 1.0;
        while voice.is_active() {
            let level = voice.step_envelope(0.5, 0.25);
            assert!(level <= previous, "release must be non-increasing");
            previous = level;
        }
        assert_eq!(voice.stage(), VoiceStage::Idle);
        assert!(voice.sound_id().is_none());
    }

    #[test]
    fn test_release_records_start_cursor() {
        let mut voice = started_voice();
        for _ in 0..10 {
            voice.advance();
        }
        voice.begin_release();
        assert_eq!(voice.release_start_cursor(), 10);

        // Un deuxième begin_release ne bouge pas le point de départ.
        voice.advance();
        voice.begin_release();
        assert_eq!(voice.release_start_cursor(), 10);
    }

    #[test]
    fn test_start_overwrites_stolen_slot() {
        let mut voice = started_voice();
        for _ in 0..50 {
            voice.advance();
            voice.step_envelope(0.5, 0.25);
        }

        voice.start("snare".into(), Arc::new(SamplePcm::mono(vec![0.1; 8])));
        assert_eq!(voice.cursor(), 0);
        assert_eq!(voice.env_level(), 0.0);
        assert_eq!(voice.stage(), VoiceStage::Attack);
        assert_eq!(voice.sound_id(), Some("snare"));
    }
}
