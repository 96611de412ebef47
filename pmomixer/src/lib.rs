#![doc = r#"
PMOMixer - Lecteur de samples polyphonique temps réel

Cette crate fournit la moitié audio de PMOPads : une banque de PCM décodés,
un pool fixe de voix avec enveloppes anti-clic, un mixeur par bloc sans
allocation, et le pont cpal qui relie le tout au périphérique de sortie.

# Architecture

```text
Thread de contrôle                    Thread audio (callback cpal)
──────────────────                    ────────────────────────────
AudioEngine ── MixerCommand ──────▶   drain ─▶ SampleStore
  load/unload/trigger/stop_all                  │ lookup
                                              VoicePool (N voix fixes)
                                                │ mix + enveloppes
                                              MixerCore ─▶ soft clip ─▶ sortie
```

Les deux domaines ne partagent rien : les PCM traversent la frontière une
seule fois, par transfert de propriété dans un `LoadSample`. Après quoi le
thread audio est seul propriétaire de la banque et des voix.

# Exemple

```no_run
use pmomixer::{AudioEngine, MixerConfig, SamplePcm};

let mut engine = AudioEngine::new(MixerConfig::default());
engine.init()?;

// PCM déjà décodé au sample rate du périphérique
let tone = SamplePcm::mono(vec![0.0; 48_000]);
engine.load_sample("kick", tone);
engine.trigger("kick");
# Ok::<(), pmomixer::MixerError>(())
```

# Garanties temps réel

- Le pool de voix est dimensionné une fois ; aucun chemin de mixage
  n'alloue, ne verrouille ni ne panique.
- Le vol de voix est déterministe (politique `oldest` par défaut,
  `quietest` en option).
- Un sample manquant, vide ou déchargé éteint la voix concernée en
  silence ; le mixeur ne remonte jamais d'erreur.
"#]

mod command;
pub mod config_ext;
mod engine;
mod error;
mod mixer;
mod pool;
mod sample;
mod store;
mod voice;

pub use command::MixerCommand;
pub use config_ext::MixerConfigExt;
pub use engine::{AudioEngine, EngineState};
pub use error::{MixerError, Result};
pub use mixer::{soft_clip, MixerConfig, MixerCore};
pub use pool::{StealPolicy, VoicePool, DEFAULT_POLYPHONY};
pub use sample::SamplePcm;
pub use store::SampleStore;
pub use voice::{Voice, VoiceStage};
