//! Le cœur temps réel : mixage par bloc des voix actives
//!
//! [`MixerCore`] vit entièrement sur le thread audio. Par bloc : drainer
//! les commandes, remettre les buffers à zéro, mixer chaque voix active
//! frame par frame avec son enveloppe, puis borner la sortie par un
//! soft-clip. Aucune allocation, aucun verrou, aucune panique sur ce
//! chemin ; toute incohérence observée dans une voix la désactive en
//! silence.

use crate::command::MixerCommand;
use crate::pool::{StealPolicy, VoicePool, DEFAULT_POLYPHONY};
use crate::store::SampleStore;
use crate::voice::VoiceStage;

/// Taille maximale de bloc supportée par les buffers de travail internes
///
/// Les hôtes servent typiquement 128 frames ; les callbacks plus larges
/// sont traités par tranches de cette taille.
const SCRATCH_FRAMES: usize = 4096;

/// Durées d'enveloppe admissibles, en millisecondes
const ENVELOPE_MS_MIN: f32 = 1.0;
const ENVELOPE_MS_MAX: f32 = 3.0;

/// Paramètres du mixeur, fixés à la construction
#[derive(Debug, Clone)]
pub struct MixerConfig {
    /// Nombre de voix simultanées (taille du pool)
    pub max_polyphony: usize,
    /// Durée d'attaque en millisecondes (bornée à [1, 3])
    pub attack_ms: f32,
    /// Durée de release en millisecondes (bornée à [1, 3])
    pub release_ms: f32,
    /// Politique de vol de voix
    pub steal_policy: StealPolicy,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            max_polyphony: DEFAULT_POLYPHONY,
            attack_ms: 2.0,
            release_ms: 3.0,
            steal_policy: StealPolicy::Oldest,
        }
    }
}

/// Mixeur polyphonique à pool fixe
#[derive(Debug)]
pub struct MixerCore {
    store: SampleStore,
    pool: VoicePool,
    attack_inc: f32,
    release_inc: f32,
    scratch_left: Vec<f32>,
    scratch_right: Vec<f32>,
}

impl MixerCore {
    /// Construit le mixeur pour un sample rate de périphérique donné
    ///
    /// Les incréments d'enveloppe sont dérivés du sample rate une fois
    /// pour toutes : attack_inc = 1 / (attack_ms · rate / 1000), idem pour
    /// la release. Ces rampes suppriment les discontinuités de début et de
    /// fin de lecture qui produisent des clics.
    pub fn new(sample_rate: u32, config: MixerConfig) -> Self {
        let rate = sample_rate.max(1) as f32;
        let attack_ms = config.attack_ms.clamp(ENVELOPE_MS_MIN, ENVELOPE_MS_MAX);
        let release_ms = config.release_ms.clamp(ENVELOPE_MS_MIN, ENVELOPE_MS_MAX);

        Self {
            store: SampleStore::new(),
            pool: VoicePool::new(config.max_polyphony, config.steal_policy),
            attack_inc: 1.0 / (attack_ms * rate / 1000.0),
            release_inc: 1.0 / (release_ms * rate / 1000.0),
            scratch_left: vec![0.0; SCRATCH_FRAMES],
            scratch_right: vec![0.0; SCRATCH_FRAMES],
        }
    }

    /// Applique une commande de contrôle (entre deux blocs)
    pub fn apply_command(&mut self, command: MixerCommand) {
        match command {
            MixerCommand::LoadSample { sound_id, pcm } => {
                self.store.load(sound_id, pcm);
            }
            MixerCommand::UnloadSample { sound_id } => {
                self.store.unload(&sound_id);
                self.pool.release_sound(&sound_id);
            }
            MixerCommand::Trigger { sound_id } => {
                // Sample absent : le déclenchement est ignoré, c'est la
                // seule condition où un trigger ne démarre pas de lecture.
                if let Some(pcm) = self.store.lookup(&sound_id).cloned() {
                    let index = self.pool.allocate();
                    self.pool.voice_mut(index).start(sound_id, pcm);
                }
            }
            MixerCommand::StopAll => {
                self.pool.release_all();
            }
        }
    }

    /// Mixe un bloc dans deux buffers canaux séparés
    ///
    /// Les buffers sont remis à zéro puis accumulés ; la sortie est bornée
    /// par [`soft_clip`] en fin de bloc.
    pub fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        let frames = left.len().min(right.len());
        left[..frames].fill(0.0);
        right[..frames].fill(0.0);

        for voice in self.pool.voices_mut() {
            if !voice.is_active() {
                continue;
            }
            let Some(sample) = voice.sample() else {
                voice.reset();
                continue;
            };
            let length = sample.len();

            for frame in 0..frames {
                if voice.cursor() >= length && voice.stage() != VoiceStage::Release {
                    voice.begin_release();
                }

                let env = voice.step_envelope(self.attack_inc, self.release_inc);
                if !voice.is_active() {
                    break;
                }

                if length > 0 {
                    // En release au-delà de la fin, on tient la dernière
                    // frame pour que la rampe descende depuis la valeur
                    // finale du sample au lieu de couper net.
                    let index = voice.cursor().min(length - 1);
                    left[frame] += sample.left()[index] * env;
                    right[frame] += sample.right()[index] * env;
                }

                voice.advance();
            }
        }

        for value in &mut left[..frames] {
            *value = soft_clip(*value);
        }
        for value in &mut right[..frames] {
            *value = soft_clip(*value);
        }
    }

    /// Mixe directement dans un buffer entrelacé au layout du périphérique
    ///
    /// Une sortie mono reçoit le canal gauche seul ; au-delà de deux
    /// canaux, les canaux surnuméraires sont mis à zéro.
    pub fn render_interleaved(&mut self, data: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        let total_frames = data.len() / channels;
        let mut done = 0;

        // process_block emprunte self mutablement : extraire les buffers de
        // travail le temps du rendu (échange de pointeurs, pas de copie).
        let mut left_buf = std::mem::take(&mut self.scratch_left);
        let mut right_buf = std::mem::take(&mut self.scratch_right);

        while done < total_frames {
            let frames = (total_frames - done).min(SCRATCH_FRAMES);
            self.process_block(&mut left_buf[..frames], &mut right_buf[..frames]);

            for frame in 0..frames {
                let base = (done + frame) * channels;
                data[base] = left_buf[frame];
                if channels >= 2 {
                    data[base + 1] = right_buf[frame];
                    for channel in 2..channels {
                        data[base + channel] = 0.0;
                    }
                }
            }

            done += frames;
        }

        self.scratch_left = left_buf;
        self.scratch_right = right_buf;
    }

    pub fn attack_inc(&self) -> f32 {
        self.attack_inc
    }

    pub fn release_inc(&self) -> f32 {
        self.release_inc
    }

    pub fn pool(&self) -> &VoicePool {
        &self.pool
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }
}

/// Borne la sortie dans (-1, 1) sans l'arête du hard clip
///
/// `tanh` est monotone, lisse en 0 et compresse progressivement quand la
/// polyphonie fait dépasser l'unité.
#[inline]
pub fn soft_clip(value: f32) -> f32 {
    value.tanh()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SamplePcm;

    const RATE: u32 = 48_000;

    fn core() -> MixerCore {
        MixerCore::new(RATE, MixerConfig::default())
    }

    fn load(core: &mut MixerCore, id: &str, frames: usize, amplitude: f32) {
        core.apply_command(MixerCommand::LoadSample {
            sound_id: id.into(),
            pcm: SamplePcm::mono(vec![amplitude; frames]),
        });
    }

    #[test]
    fn test_envelope_increments_follow_sample_rate() {
        let core = core();
        // 2 ms d'attaque à 48 kHz = 96 frames
        assert!((core.attack_inc() - 1.0 / 96.0).abs() < 1e-9);
        // 3 ms de release = 144 frames
        assert!((core.release_inc() - 1.0 / 144.0).abs() < 1e-9);
    }

    #[test]
    fn test_envelope_ms_out_of_range_is_clamped() {
        let core = MixerCore::new(
            RATE,
            MixerConfig {
                attack_ms: 0.0,
                release_ms: 50.0,
                ..MixerConfig::default()
            },
        );
        assert!((core.attack_inc() - 1.0 / 48.0).abs() < 1e-9); // 1 ms
        assert!((core.release_inc() - 1.0 / 144.0).abs() < 1e-9); // 3 ms
    }

    #[test]
    fn test_trigger_without_sample_is_silent_noop() {
        let mut core = core();
        core.apply_command(MixerCommand::Trigger {
            sound_id: "ghost".into(),
        });
        assert_eq!(core.pool().active_count(), 0);
    }

    #[test]
    fn test_trigger_starts_voice_from_zero() {
        let mut core = core();
        load(&mut core, "kick", 1024, 0.5);
        core.apply_command(MixerCommand::Trigger {
            sound_id: "kick".into(),
        });

        let voice = &core.pool().voices()[0];
        assert!(voice.is_active());
        assert_eq!(voice.cursor(), 0);
        assert_eq!(voice.env_level(), 0.0);
    }

    #[test]
    fn test_idempotent_load() {
        let mut left = [0.0f32; 128];
        let mut right = [0.0f32; 128];

        let mut once = core();
        load(&mut once, "kick", 256, 0.5);
        once.apply_command(MixerCommand::Trigger {
            sound_id: "kick".into(),
        });
        once.process_block(&mut left, &mut right);
        let reference = left;

        let mut twice = core();
        load(&mut twice, "kick", 256, 0.5);
        load(&mut twice, "kick", 256, 0.5);
        twice.apply_command(MixerCommand::Trigger {
            sound_id: "kick".into(),
        });
        twice.process_block(&mut left, &mut right);

        assert_eq!(reference, left);
        assert_eq!(twice.store().len(), 1);
    }

    #[test]
    fn test_unload_releases_bound_voices() {
        let mut core = core();
        load(&mut core, "kick", 48_000, 0.5);
        core.apply_command(MixerCommand::Trigger {
            sound_id: "kick".into(),
        });
        core.apply_command(MixerCommand::UnloadSample {
            sound_id: "kick".into(),
        });

        assert_eq!(core.pool().voices()[0].stage(), VoiceStage::Release);
        assert!(core.store().is_empty());

        // La release se termine toute seule : quelques blocs suffisent
        // (3 ms à 48 kHz = 144 frames).
        let mut left = [0.0f32; 128];
        let mut right = [0.0f32; 128];
        core.process_block(&mut left, &mut right);
        core.process_block(&mut left, &mut right);
        assert_eq!(core.pool().active_count(), 0);
    }

    #[test]
    fn test_stop_all_releases_everything() {
        let mut core = core();
        for i in 0..4 {
            let id = format!("sound-{i}");
            load(&mut core, &id, 48_000, 0.25);
            core.apply_command(MixerCommand::Trigger {
                sound_id: id.into(),
            });
        }
        core.apply_command(MixerCommand::StopAll);

        assert!(core
            .pool()
            .voices()
            .iter()
            .filter(|v| v.is_active())
            .all(|v| v.stage() == VoiceStage::Release));
    }

    #[test]
    fn test_empty_sample_does_not_hang_voice() {
        let mut core = core();
        load(&mut core, "empty", 0, 0.0);
        core.apply_command(MixerCommand::Trigger {
            sound_id: "empty".into(),
        });
        assert_eq!(core.pool().active_count(), 1);

        let mut left = [0.0f32; 256];
        let mut right = [0.0f32; 256];
        core.process_block(&mut left, &mut right);

        // Au plus un bloc de release, jamais de voix bloquée.
        assert_eq!(core.pool().active_count(), 0);
        assert!(left.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_soft_clip_bounds_any_finite_input() {
        for value in [-1000.0, -2.0, -1.0, 0.0, 1.0, 2.0, 1000.0] {
            let clipped = soft_clip(value);
            assert!(clipped.abs() < 1.0);
        }
        assert_eq!(soft_clip(0.0), 0.0);
    }

    #[test]
    fn test_mono_output_gets_left_channel_only() {
        let mut core = core();
        core.apply_command(MixerCommand::LoadSample {
            sound_id: "pan".into(),
            pcm: SamplePcm::stereo(vec![0.5; 512], vec![-0.5; 512]).unwrap(),
        });
        core.apply_command(MixerCommand::Trigger {
            sound_id: "pan".into(),
        });

        let mut data = vec![0.0f32; 128];
        core.render_interleaved(&mut data, 1);

        // Passé l'attaque (96 frames), on doit voir le canal gauche positif.
        assert!(data[120] > 0.0);
    }

    #[test]
    fn test_interleaved_stereo_layout() {
        let mut core = core();
        core.apply_command(MixerCommand::LoadSample {
            sound_id: "pan".into(),
            pcm: SamplePcm::stereo(vec![0.5; 512], vec![-0.5; 512]).unwrap(),
        });
        core.apply_command(MixerCommand::Trigger {
            sound_id: "pan".into(),
        });

        let mut data = vec![0.0f32; 256 * 2];
        core.render_interleaved(&mut data, 2);

        // Frame 200 : attaque finie, gauche > 0 > droite.
        assert!(data[200 * 2] > 0.0);
        assert!(data[200 * 2 + 1] < 0.0);
    }
}
