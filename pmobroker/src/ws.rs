//! Endpoint WebSocket `/ws` : pompe entre les sockets et la boucle broker
//!
//! Chaque socket accepté donne deux tâches : une lecture qui pousse les
//! trames texte vers la boucle, une écriture qui draine le canal sortant
//! de la connexion. La fermeture de l'un ou l'autre converge vers le
//! chemin de fermeture normal du broker.

use crate::broker::BrokerHandle;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};

/// Handler axum de l'upgrade WebSocket
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(handle): State<BrokerHandle>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, handle))
}

async fn handle_socket(socket: WebSocket, handle: BrokerHandle) {
    let (mut sink, mut stream) = socket.split();
    let (conn_id, mut outbound) = handle.connect();

    // Tâche d'écriture : draine le canal sortant vers le socket.
    // Elle se termine quand le broker retire la connexion (canal fermé)
    // ou quand le socket part.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Lecture : seules les trames texte portent le protocole.
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => handle.frame(conn_id, text.to_string()),
            Message::Close(_) => break,
            // Pas de trames binaires dans ce protocole ; ping/pong
            // transport sont gérés par axum.
            _ => {}
        }
    }

    handle.disconnect(conn_id);
    writer.abort();
}
