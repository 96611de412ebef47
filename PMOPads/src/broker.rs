//! Mode broker : le serveur central de fan-out

use pmobroker::{BrokerOptions, PadBrokerServerExt};
use pmoconfig::get_config;
use tracing::info;

pub async fn run() -> anyhow::Result<()> {
    let config = get_config();

    // ========== PHASE 1 : Serveur HTTP ==========
    let server = pmoserver::init_server();

    // ========== PHASE 2 : Broker de rooms ==========
    info!("📡 Registering pad broker...");
    let _broker = server
        .write()
        .await
        .register_pad_broker(BrokerOptions::from_config(&config))
        .await;

    let info = server.read().await.info();
    info!(
        "✅ Broker ready: ws://{}:{}/ws (health: {}:{}/health)",
        info.base_url.trim_start_matches("http://"),
        info.http_port,
        info.base_url,
        info.http_port
    );

    // ========== PHASE 3 : Démarrage ==========
    server.write().await.start().await;
    server.write().await.wait().await;

    info!("Broker stopped");
    Ok(())
}
