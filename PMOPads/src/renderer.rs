//! Mode renderer : le nœud qui possède le périphérique audio
//!
//! Le renderer charge sa banque de sons, rejoint la room en tant
//! qu'autorité audio, déclenche le mixeur sur chaque `pad-hit` reçu et
//! répond aux `request-sync` avec son état courant (tempo + mappings).

use crate::tones;
use pmoconfig::get_config;
use pmolink::{LinkEvent, LinkOptions, PadLink};
use pmomixer::{AudioEngine, MixerConfig};
use pmowire::{Envelope, PadMappings, Role};
use tracing::{debug, info, warn};

const DEFAULT_TEMPO: u16 = 120;

pub async fn run(room: &str) -> anyhow::Result<()> {
    let config = get_config();

    // ========== PHASE 1 : Moteur audio ==========
    // L'init est le geste explicite qui ouvre le périphérique.
    let mut engine = AudioEngine::new(MixerConfig::from_config(&config));
    engine.init()?;
    let sample_rate = engine.sample_rate().unwrap_or(48_000);

    // ========== PHASE 2 : Banque de sons et mappings ==========
    info!("🎹 Loading tone bank ({} Hz)...", sample_rate);
    let mut pad_mappings = PadMappings::new();
    for (pad, (sound_id, pcm)) in tones::tone_bank(sample_rate).into_iter().enumerate() {
        engine.load_sample(&sound_id, pcm);
        pad_mappings.insert(pad as u8, sound_id);
    }

    // ========== PHASE 3 : Connexion à la room ==========
    let url = crate::broker_url(&config);
    info!("📡 Joining room '{}' at {} as renderer", room, url);
    let (link, mut events) = PadLink::connect(LinkOptions::from_config(
        &config,
        url,
        room,
        Role::Renderer,
    ));

    let mut tempo = DEFAULT_TEMPO;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C reçu, arrêt du renderer");
                break;
            }
            event = events.recv() => match event {
                Some(LinkEvent::Connected) => {
                    info!("✅ Connected to broker");
                }
                Some(LinkEvent::Disconnected) => {
                    warn!("Broker lost, reconnecting in background");
                }
                Some(LinkEvent::Message(envelope)) => {
                    handle_message(envelope, &engine, &link, &pad_mappings, &mut tempo);
                }
                None => break,
            }
        }
    }

    engine.stop_all();
    link.shutdown();
    Ok(())
}

fn handle_message(
    envelope: Envelope,
    engine: &AudioEngine,
    link: &PadLink,
    pad_mappings: &PadMappings,
    tempo: &mut u16,
) {
    match envelope {
        Envelope::PadHit { pad_index, .. } => match pad_mappings.get(&pad_index) {
            Some(sound_id) => engine.trigger(sound_id),
            None => debug!(pad_index, "No sound mapped on this pad"),
        },
        Envelope::RequestSync => {
            // Convergence des arrivées tardives : publier l'état courant.
            link.send(Envelope::SyncState {
                tempo: *tempo,
                pad_mappings: pad_mappings.clone(),
            });
        }
        Envelope::TempoChange { tempo: new_tempo } => {
            info!(tempo = new_tempo, "Tempo changed");
            *tempo = new_tempo;
        }
        // Le renderer est l'autorité : un sync-state entrant (le sien en
        // écho) n'a rien à lui apprendre.
        Envelope::SyncState { .. } => {}
        _ => {}
    }
}
