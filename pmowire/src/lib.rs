//! # pmowire - Protocole filaire du broker PMOPads
//!
//! Messages JSON textuels échangés sur le WebSocket `/ws`, discriminés par
//! le champ `type` (kebab-case). Le décodage est strict : toute trame
//! malformée, tout type inconnu ou tout champ hors bornes donne `None`,
//! jamais une panique. Le broker répond alors par un message `error` et
//! ignore la trame.
//!
//! Les PCM audio ne transitent jamais par ce protocole ; seuls des
//! événements symboliques (pad, tempo, synchronisation d'état) circulent.
//!
//! ## Exemple
//!
//! ```
//! use pmowire::{parse, Envelope, Role};
//!
//! let msg = parse(r#"{"type":"join","room-id":"studio","role":"controller"}"#).unwrap();
//! assert_eq!(
//!     msg,
//!     Envelope::Join { room_id: "studio".into(), role: Role::Controller }
//! );
//! assert!(parse(r#"{"type":"pad-hit","pad-index":16}"#).is_none());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Nombre de pads d'une surface (indices 0..=15)
pub const PAD_COUNT: u8 = 16;
/// Tempo minimal accepté (BPM)
pub const TEMPO_MIN: u16 = 20;
/// Tempo maximal accepté (BPM)
pub const TEMPO_MAX: u16 = 300;
/// Vélocité maximale d'un pad-hit
pub const VELOCITY_MAX: u8 = 127;

/// Rôle d'une connexion dans une room
///
/// Un seul renderer par room par convention ; le broker n'impose que
/// l'autorité du renderer sur `sync-state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Renderer,
    Controller,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Renderer => "renderer",
            Role::Controller => "controller",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Correspondance pad → identifiant de son
///
/// Opaque pour le broker ; interprétée uniquement par la couche de contrôle
/// du renderer. `BTreeMap` pour une sérialisation canonique (clés triées).
pub type PadMappings = BTreeMap<u8, String>;

/// L'ensemble des messages reconnus sur le fil
///
/// Voir la table du protocole : `join`, `pad-hit`, `sync-state`,
/// `tempo-change`, `request-sync`, `heartbeat`, `pong`, `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Envelope {
    /// C→S : rejoindre une room avec un rôle
    #[serde(rename_all = "kebab-case")]
    Join { room_id: String, role: Role },

    /// Déclenchement d'un pad (vélocité optionnelle)
    #[serde(rename_all = "kebab-case")]
    PadHit {
        pad_index: u8,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        velocity: Option<u8>,
    },

    /// Snapshot d'état émis par le renderer pour les arrivées tardives
    #[serde(rename_all = "kebab-case")]
    SyncState {
        tempo: u16,
        #[serde(with = "pad_key_map")]
        pad_mappings: PadMappings,
    },

    /// Changement de tempo
    TempoChange { tempo: u16 },

    /// S→clients : demande au renderer d'émettre son état courant
    RequestSync,

    /// C→S : maintien d'activité
    Heartbeat,

    /// S→C : réponse au heartbeat
    Pong,

    /// S→C : violation de protocole
    Error { message: String },
}

impl Envelope {
    /// Vérifie les bornes des champs du message
    ///
    /// La désérialisation serde garantit déjà les types (un `pad-index`
    /// négatif ou non entier échoue en amont) ; on ne contrôle ici que les
    /// plages métier.
    pub fn is_valid(&self) -> bool {
        match self {
            Envelope::Join { room_id, .. } => !room_id.is_empty(),
            Envelope::PadHit {
                pad_index,
                velocity,
            } => *pad_index < PAD_COUNT && velocity.is_none_or(|v| v <= VELOCITY_MAX),
            Envelope::SyncState {
                tempo,
                pad_mappings,
            } => tempo_in_range(*tempo) && pad_mappings.keys().all(|pad| *pad < PAD_COUNT),
            Envelope::TempoChange { tempo } => tempo_in_range(*tempo),
            Envelope::RequestSync
            | Envelope::Heartbeat
            | Envelope::Pong
            | Envelope::Error { .. } => true,
        }
    }

    /// Sérialise le message en JSON canonique
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("envelope shapes always serialize")
    }
}

fn tempo_in_range(tempo: u16) -> bool {
    (TEMPO_MIN..=TEMPO_MAX).contains(&tempo)
}

/// Clés de `pad-mappings` : entiers côté Rust, chaînes côté JSON
///
/// L'étiquetage interne par `type` fait passer la désérialisation par un
/// tampon serde qui ne convertit pas les clés de map `"0"` → `u8` ; on fait
/// la conversion explicitement.
mod pad_key_map {
    use super::PadMappings;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S>(map: &PadMappings, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_map(map.iter().map(|(pad, sound)| (pad.to_string(), sound)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<PadMappings, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(key, sound)| {
                key.parse::<u8>()
                    .map(|pad| (pad, sound))
                    .map_err(|_| D::Error::custom(format!("invalid pad key: {key}")))
            })
            .collect()
    }
}

/// Décode une trame texte en message validé
///
/// Retourne `None` pour toute trame que le broker doit refuser : JSON
/// malformé, type inconnu, champ manquant ou hors bornes.
pub fn parse(text: &str) -> Option<Envelope> {
    let envelope: Envelope = serde_json::from_str(text).ok()?;
    envelope.is_valid().then_some(envelope)
}
