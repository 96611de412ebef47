//! La boucle du broker : un acteur unique, propriétaire de tout l'état
//!
//! Toutes les connexions alimentent la même file d'événements ; la boucle
//! les traite un par un, si bien que l'ordre observé par chaque abonné
//! d'une room est exactement l'ordre de dispatch. Aucune violation de
//! protocole ne ferme un socket : le broker répond par un message `error`
//! et continue.

use crate::connection::{ConnId, RoomConnection};
use crate::registry::RoomRegistry;
use pmowire::{Envelope, Role};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Réponses d'erreur du protocole
const ERR_INVALID_FORMAT: &str = "Invalid message format";
const ERR_NOT_JOINED: &str = "Not joined";
const ERR_RENDERER_ONLY: &str = "Only renderer can sync state";

/// Paramètres de vie du broker
#[derive(Debug, Clone)]
pub struct BrokerOptions {
    /// Fenêtre d'inactivité au-delà de laquelle une connexion est fermée
    pub heartbeat_timeout: Duration,
    /// Période de balayage des connexions inactives
    pub sweep_interval: Duration,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_millis(30_000),
            sweep_interval: Duration::from_secs(5),
        }
    }
}

/// Événements poussés par les tâches socket vers la boucle
#[derive(Debug)]
pub enum BrokerEvent {
    /// Socket ouvert ; `outbound` est drainé par la tâche d'écriture
    Open {
        conn_id: ConnId,
        outbound: mpsc::UnboundedSender<String>,
    },
    /// Trame texte reçue
    Frame { conn_id: ConnId, text: String },
    /// Socket fermé côté client
    Closed { conn_id: ConnId },
}

/// Poignée clonable vers la boucle du broker
///
/// C'est l'interface des tâches socket (et des tests : la poignée permet
/// de piloter le broker sans aucun socket réel).
#[derive(Debug, Clone)]
pub struct BrokerHandle {
    events: mpsc::UnboundedSender<BrokerEvent>,
    next_conn_id: Arc<AtomicU64>,
    stop_token: CancellationToken,
}

impl BrokerHandle {
    /// Déclare une nouvelle connexion et retourne son flux sortant
    pub fn connect(&self) -> (ConnId, mpsc::UnboundedReceiver<String>) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let _ = self.events.send(BrokerEvent::Open {
            conn_id,
            outbound: outbound_tx,
        });
        (conn_id, outbound_rx)
    }

    /// Transmet une trame texte reçue du socket
    pub fn frame(&self, conn_id: ConnId, text: String) {
        let _ = self.events.send(BrokerEvent::Frame { conn_id, text });
    }

    /// Signale la fermeture du socket
    pub fn disconnect(&self, conn_id: ConnId) {
        let _ = self.events.send(BrokerEvent::Closed { conn_id });
    }

    /// Arrête la boucle du broker
    pub fn stop(&self) {
        self.stop_token.cancel();
    }
}

/// L'acteur broker
pub struct Broker {
    connections: HashMap<ConnId, RoomConnection>,
    registry: RoomRegistry,
    options: BrokerOptions,
    events: mpsc::UnboundedReceiver<BrokerEvent>,
    stop_token: CancellationToken,
}

impl Broker {
    /// Démarre la boucle en tâche de fond et retourne sa poignée
    pub fn spawn(options: BrokerOptions) -> BrokerHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let stop_token = CancellationToken::new();

        let broker = Broker {
            connections: HashMap::new(),
            registry: RoomRegistry::new(),
            options,
            events: events_rx,
            stop_token: stop_token.clone(),
        };
        tokio::spawn(broker.run());

        BrokerHandle {
            events: events_tx,
            next_conn_id: Arc::new(AtomicU64::new(1)),
            stop_token,
        }
    }

    async fn run(mut self) {
        tracing::debug!("Broker loop started");
        let mut sweep = tokio::time::interval(self.options.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.stop_token.cancelled() => {
                    tracing::debug!("Broker loop cancelled");
                    break;
                }
                event = self.events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            tracing::debug!("Broker event channel closed");
                            break;
                        }
                    }
                }
                _ = sweep.tick() => {
                    self.sweep_stale();
                }
            }
        }
    }

    fn handle_event(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Open { conn_id, outbound } => {
                tracing::info!(conn_id, "Connection opened");
                self.connections
                    .insert(conn_id, RoomConnection::new(outbound));
            }
            BrokerEvent::Frame { conn_id, text } => {
                self.handle_frame(conn_id, &text);
            }
            BrokerEvent::Closed { conn_id } => {
                self.remove_connection(conn_id);
            }
        }
    }

    fn handle_frame(&mut self, conn_id: ConnId, text: &str) {
        // Toute trame, même invalide, atteste que le pair est vivant.
        if let Some(connection) = self.connections.get_mut(&conn_id) {
            connection.touch();
        } else {
            tracing::debug!(conn_id, "Frame from unknown connection, dropping");
            return;
        }

        let Some(envelope) = pmowire::parse(text) else {
            tracing::warn!(conn_id, "Invalid frame");
            self.send_error(conn_id, ERR_INVALID_FORMAT);
            return;
        };

        match envelope {
            Envelope::Join { room_id, role } => self.handle_join(conn_id, room_id, role),
            Envelope::PadHit { .. } | Envelope::TempoChange { .. } => {
                self.publish_from(conn_id, &envelope);
            }
            Envelope::SyncState { .. } => self.handle_sync_state(conn_id, &envelope),
            Envelope::Heartbeat => {
                self.send_to(conn_id, &Envelope::Pong);
            }
            Envelope::Pong => {
                // Activité déjà notée, rien à répondre.
            }
            Envelope::RequestSync | Envelope::Error { .. } => {
                // Types émis par le serveur : un client qui les envoie est
                // ignoré sans fermer le socket.
                tracing::debug!(conn_id, "Dropping server-originated message type");
            }
        }
    }

    fn handle_join(&mut self, conn_id: ConnId, room_id: String, role: Role) {
        // Une connexion n'appartient qu'à une room : quitter la précédente.
        if let Some(previous) = self
            .connections
            .get(&conn_id)
            .and_then(|c| c.room_id.clone())
        {
            self.registry.unsubscribe(&previous, conn_id);
            tracing::info!(conn_id, room = %previous, "Left room");
        }

        // Connexion partie entre temps : ne pas créer d'entrée fantôme.
        let Some(connection) = self.connections.get_mut(&conn_id) else {
            return;
        };
        connection.room_id = Some(room_id.clone());
        connection.role = Some(role);
        self.registry.subscribe(&room_id, conn_id);
        tracing::info!(conn_id, room = %room_id, role = %role, "Joined room");

        // L'arrivée d'un contrôleur déclenche une resynchronisation : le
        // renderer de la room répondra par un sync-state.
        if role == Role::Controller {
            self.publish(&room_id, &Envelope::RequestSync);
        }
    }

    fn handle_sync_state(&mut self, conn_id: ConnId, envelope: &Envelope) {
        let (joined, role) = match self.connections.get(&conn_id) {
            Some(connection) => (connection.is_joined(), connection.role),
            None => return,
        };
        if !joined {
            self.send_error(conn_id, ERR_NOT_JOINED);
            return;
        }
        // Seul le renderer fait autorité sur l'état de la room.
        if role != Some(Role::Renderer) {
            self.send_error(conn_id, ERR_RENDERER_ONLY);
            return;
        }
        self.publish_from(conn_id, envelope);
    }

    /// Publie un message dans la room de l'émetteur (émetteur inclus)
    fn publish_from(&mut self, conn_id: ConnId, envelope: &Envelope) {
        let room = self
            .connections
            .get(&conn_id)
            .and_then(|c| c.room_id.clone());
        match room {
            Some(room_id) => self.publish(&room_id, envelope),
            None => self.send_error(conn_id, ERR_NOT_JOINED),
        }
    }

    /// Fan-out d'un message à tous les membres d'une room
    ///
    /// La sérialisation n'est faite qu'une fois ; l'ordre de réception par
    /// abonné est l'ordre d'appel de cette fonction.
    fn publish(&mut self, room_id: &str, envelope: &Envelope) {
        let frame = envelope.to_json();
        let mut dead = Vec::new();

        for member in self.registry.members(room_id) {
            let delivered = self
                .connections
                .get(&member)
                .map(|connection| connection.send(&frame))
                .unwrap_or(false);
            if !delivered {
                dead.push(member);
            }
        }

        // Les sockets déjà partis suivent le chemin de fermeture normal.
        for member in dead {
            self.remove_connection(member);
        }
    }

    fn send_to(&mut self, conn_id: ConnId, envelope: &Envelope) {
        let delivered = self
            .connections
            .get(&conn_id)
            .map(|connection| connection.send(&envelope.to_json()))
            .unwrap_or(false);
        if !delivered {
            self.remove_connection(conn_id);
        }
    }

    fn send_error(&mut self, conn_id: ConnId, message: &str) {
        self.send_to(
            conn_id,
            &Envelope::Error {
                message: message.to_string(),
            },
        );
    }

    fn remove_connection(&mut self, conn_id: ConnId) {
        if let Some(connection) = self.connections.remove(&conn_id) {
            if let Some(room_id) = &connection.room_id {
                self.registry.unsubscribe(room_id, conn_id);
            }
            tracing::info!(
                conn_id,
                duration_s = connection.connected_at.elapsed().as_secs(),
                "Connection closed"
            );
        }
    }

    /// Ferme les connexions sans activité depuis plus de `heartbeat_timeout`
    ///
    /// Retirer la fiche fait tomber le canal sortant, ce qui termine la
    /// tâche d'écriture et ferme le socket ; le `Closed` qui suivra est
    /// idempotent.
    fn sweep_stale(&mut self) {
        let now = Instant::now();
        let timeout = self.options.heartbeat_timeout;
        let stale: Vec<ConnId> = self
            .connections
            .iter()
            .filter(|(_, connection)| now.duration_since(connection.last_activity) > timeout)
            .map(|(conn_id, _)| *conn_id)
            .collect();

        for conn_id in stale {
            tracing::warn!(conn_id, "Closing stale connection");
            self.remove_connection(conn_id);
        }
    }
}
