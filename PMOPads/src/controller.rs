//! Mode contrôleur : une surface de pads pilotée au clavier
//!
//! Les contrôleurs ne produisent jamais de son : ils émettent des
//! événements symboliques vers la room et affichent ce qui en revient
//! (écho des pads, état du renderer, changements de tempo).

use pmoconfig::get_config;
use pmolink::{LinkEvent, LinkOptions, PadLink};
use pmowire::{Envelope, Role, PAD_COUNT, TEMPO_MAX, TEMPO_MIN};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

pub async fn run(room: &str) -> anyhow::Result<()> {
    let config = get_config();

    let url = crate::broker_url(&config);
    info!("📡 Joining room '{}' at {} as controller", room, url);
    let (link, mut events) = PadLink::connect(LinkOptions::from_config(
        &config,
        url,
        room,
        Role::Controller,
    ));

    println!("Pads: 0..{} | tempo <bpm> | quit", PAD_COUNT - 1);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !handle_line(line.trim(), &link) {
                        break;
                    }
                }
                None => break,
            },
            event = events.recv() => match event {
                Some(LinkEvent::Connected) => info!("✅ Connected to broker"),
                Some(LinkEvent::Disconnected) => warn!("Broker lost, reconnecting"),
                Some(LinkEvent::Message(envelope)) => print_message(envelope),
                None => break,
            }
        }
    }

    link.shutdown();
    Ok(())
}

/// Interprète une ligne de commande ; retourne `false` pour quitter
fn handle_line(line: &str, link: &PadLink) -> bool {
    if line.is_empty() {
        return true;
    }
    if line == "quit" {
        return false;
    }

    if let Some(bpm) = line.strip_prefix("tempo ") {
        match bpm.trim().parse::<u16>() {
            Ok(tempo) if (TEMPO_MIN..=TEMPO_MAX).contains(&tempo) => {
                link.send(Envelope::TempoChange { tempo });
            }
            _ => println!("Tempo entre {TEMPO_MIN} et {TEMPO_MAX}"),
        }
        return true;
    }

    match line.parse::<u8>() {
        Ok(pad_index) if pad_index < PAD_COUNT => {
            link.send(Envelope::PadHit {
                pad_index,
                velocity: Some(100),
            });
        }
        _ => println!("Pad entre 0 et {}", PAD_COUNT - 1),
    }
    true
}

fn print_message(envelope: Envelope) {
    match envelope {
        // L'écho de nos propres pads sert de confirmation de livraison.
        Envelope::PadHit { pad_index, .. } => info!(pad_index, "pad-hit"),
        Envelope::SyncState {
            tempo,
            pad_mappings,
        } => info!(tempo, pads = pad_mappings.len(), "Room state received"),
        Envelope::TempoChange { tempo } => info!(tempo, "Tempo changed"),
        _ => {}
    }
}
