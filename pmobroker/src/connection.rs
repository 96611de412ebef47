//! Per-connection state owned by the broker task

use pmowire::Role;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Identifiant de connexion, alloué par le broker
pub type ConnId = u64;

/// Fiche d'une connexion socket
///
/// Créée vide à l'ouverture ; room et rôle sont renseignés au premier
/// `join` valide. Une connexion appartient à au plus une room à la fois :
/// changer de room passe par une désinscription de la précédente.
#[derive(Debug)]
pub struct RoomConnection {
    pub room_id: Option<String>,
    pub role: Option<Role>,
    pub connected_at: Instant,
    pub last_activity: Instant,
    outbound: mpsc::UnboundedSender<String>,
}

impl RoomConnection {
    pub fn new(outbound: mpsc::UnboundedSender<String>) -> Self {
        let now = Instant::now();
        Self {
            room_id: None,
            role: None,
            connected_at: now,
            last_activity: now,
            outbound,
        }
    }

    /// Pousse une trame sérialisée vers la tâche d'écriture du socket
    ///
    /// Retourne `false` si le socket est déjà parti ; l'appelant traite la
    /// connexion comme fermée.
    pub fn send(&self, frame: &str) -> bool {
        self.outbound.send(frame.to_string()).is_ok()
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn is_joined(&self) -> bool {
        self.room_id.is_some()
    }
}
