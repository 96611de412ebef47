//! Transport client : socket, reconnexion, file d'attente, heartbeat
//!
//! [`PadLink`] encapsule tout le cycle de vie du socket d'un nœud. La
//! tâche pilote se reconnecte indéfiniment avec backoff, envoie le `join`
//! dès la connexion, vide la file des messages accumulés hors ligne dans
//! l'ordre d'émission, et entretient le heartbeat. Les trames entrantes
//! remontent au nœud sous forme de [`LinkEvent`].

use crate::backoff::Backoff;
use futures_util::{SinkExt, StreamExt};
use pmowire::{Envelope, Role};
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Paramètres du transport
#[derive(Debug, Clone)]
pub struct LinkOptions {
    /// URL du broker, ex. `ws://localhost:5174/ws`
    pub url: String,
    /// Room à rejoindre dès la connexion
    pub room_id: String,
    /// Rôle annoncé dans le `join`
    pub role: Role,
    /// Cadence du heartbeat (25 s, sous la fenêtre serveur de 30 s)
    pub heartbeat_interval: Duration,
    /// Premier délai de reconnexion
    pub reconnect_initial: Duration,
    /// Plafond du délai de reconnexion
    pub reconnect_max: Duration,
}

impl LinkOptions {
    pub fn new(url: impl Into<String>, room_id: impl Into<String>, role: Role) -> Self {
        Self {
            url: url.into(),
            room_id: room_id.into(),
            role,
            heartbeat_interval: Duration::from_millis(25_000),
            reconnect_initial: Duration::from_millis(1_000),
            reconnect_max: Duration::from_millis(30_000),
        }
    }
}

/// Événements remontés au nœud propriétaire
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Socket établi, `join` envoyé, file hors-ligne vidée
    Connected,
    /// Socket perdu ; la reconnexion est déjà programmée
    Disconnected,
    /// Trame valide reçue du broker
    Message(Envelope),
}

/// Poignée du transport
///
/// `send` n'échoue jamais du point de vue de l'appelant : hors connexion,
/// le message rejoint la file et partira après le prochain `join`.
#[derive(Debug, Clone)]
pub struct PadLink {
    outbound: mpsc::UnboundedSender<Envelope>,
    stop_token: CancellationToken,
}

impl PadLink {
    /// Démarre la tâche pilote et retourne la poignée + le flux d'événements
    pub fn connect(options: LinkOptions) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let stop_token = CancellationToken::new();

        tokio::spawn(run_driver(
            options,
            outbound_rx,
            events_tx,
            stop_token.clone(),
        ));

        (
            Self {
                outbound: outbound_tx,
                stop_token,
            },
            events_rx,
        )
    }

    /// Envoie (ou met en file) un message vers le broker
    pub fn send(&self, envelope: Envelope) {
        let _ = self.outbound.send(envelope);
    }

    /// Coupe les timers, ferme le socket, jette la file en attente
    pub fn shutdown(&self) {
        self.stop_token.cancel();
    }
}

/// Boucle pilote : disconnected → connecting → connected → … sans fin
async fn run_driver(
    options: LinkOptions,
    mut outbound_rx: mpsc::UnboundedReceiver<Envelope>,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    stop_token: CancellationToken,
) {
    let mut backoff = Backoff::new(options.reconnect_initial, options.reconnect_max);
    // Messages dont l'envoi a échoué en vol : repartent en tête au
    // prochain flush pour préserver l'ordre d'émission.
    let mut pending: VecDeque<Envelope> = VecDeque::new();

    loop {
        let socket = tokio::select! {
            _ = stop_token.cancelled() => {
                tracing::debug!("PadLink cancelled before connect");
                return;
            }
            result = connect_async(options.url.as_str()) => match result {
                Ok((socket, _response)) => socket,
                Err(err) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        url = %options.url,
                        retry_in_ms = delay.as_millis() as u64,
                        "Broker connection failed: {}", err
                    );
                    tokio::select! {
                        _ = stop_token.cancelled() => return,
                        _ = tokio::time::sleep(delay) => continue,
                    }
                }
            }
        };

        backoff.reset();
        let (mut sink, mut stream) = socket.split();

        // `join` part toujours en premier, avant la file hors-ligne.
        let join = Envelope::Join {
            room_id: options.room_id.clone(),
            role: options.role,
        };
        if sink.send(Message::Text(join.to_json().into())).await.is_err() {
            let _ = events_tx.send(LinkEvent::Disconnected);
            continue;
        }

        // Vider la file FIFO accumulée hors connexion.
        let mut flush_failed = false;
        while let Some(envelope) = pending.pop_front() {
            if sink
                .send(Message::Text(envelope.to_json().into()))
                .await
                .is_err()
            {
                pending.push_front(envelope);
                flush_failed = true;
                break;
            }
        }
        if flush_failed {
            let _ = events_tx.send(LinkEvent::Disconnected);
            continue;
        }

        tracing::info!(url = %options.url, room = %options.room_id, role = %options.role, "Connected to broker");
        let _ = events_tx.send(LinkEvent::Connected);

        // Premier battement dans un intervalle, pas immédiatement.
        let mut heartbeat = interval_at(
            Instant::now() + options.heartbeat_interval,
            options.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Session : tant que le socket tient.
        loop {
            tokio::select! {
                _ = stop_token.cancelled() => {
                    let _ = sink.close().await;
                    tracing::debug!("PadLink cancelled");
                    return;
                }
                _ = heartbeat.tick() => {
                    if sink
                        .send(Message::Text(Envelope::Heartbeat.to_json().into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                envelope = outbound_rx.recv() => match envelope {
                    Some(envelope) => {
                        if sink
                            .send(Message::Text(envelope.to_json().into()))
                            .await
                            .is_err()
                        {
                            // Repart en file : il sera rejoué après reconnexion.
                            pending.push_back(envelope);
                            break;
                        }
                    }
                    None => {
                        // Poignée abandonnée : fin de vie du transport.
                        let _ = sink.close().await;
                        return;
                    }
                },
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        match pmowire::parse(text.as_str()) {
                            Some(envelope) => {
                                let _ = events_tx.send(LinkEvent::Message(envelope));
                            }
                            None => {
                                tracing::warn!("Dropping unparseable frame from broker");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::warn!("Socket error: {}", err);
                        break;
                    }
                }
            }
        }

        tracing::info!(url = %options.url, "Disconnected from broker, will reconnect");
        let _ = events_tx.send(LinkEvent::Disconnected);

        let delay = backoff.next_delay();
        tokio::select! {
            _ = stop_token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
