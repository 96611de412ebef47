//! Extension pour enregistrer le broker sur un `pmoserver::Server`
//!
//! Suivant le pattern des autres crates de la famille : le serveur ne
//! connaît pas le broker, c'est le broker qui s'enregistre dessus via un
//! trait d'extension.

use crate::broker::{Broker, BrokerHandle, BrokerOptions};
use crate::ws::ws_handler;
use pmoserver::Server;

/// Trait d'extension pour monter le broker sur le serveur HTTP
#[async_trait::async_trait]
pub trait PadBrokerServerExt {
    /// Démarre la boucle broker et enregistre `/ws` et `/health`
    ///
    /// Retourne la poignée du broker (utile pour l'arrêter ou pour les
    /// tests).
    async fn register_pad_broker(&mut self, options: BrokerOptions) -> BrokerHandle;
}

#[async_trait::async_trait]
impl PadBrokerServerExt for Server {
    async fn register_pad_broker(&mut self, options: BrokerOptions) -> BrokerHandle {
        let handle = Broker::spawn(options);

        self.add_handler_with_state("/ws", ws_handler, handle.clone())
            .await;

        self.add_route("/health", || async {
            serde_json::json!({
                "status": "ok",
                "timestamp": chrono::Utc::now().timestamp_millis(),
            })
        })
        .await;

        tracing::info!("Pad broker registered on /ws (health on /health)");
        handle
    }
}
