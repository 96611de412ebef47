use pmoconfig::get_config;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod broker;
mod controller;
mod renderer;
mod tones;

/// URL WebSocket du broker dérivée de la configuration
pub(crate) fn broker_url(config: &pmoconfig::Config) -> String {
    let host = config
        .get_base_url()
        .trim_start_matches("http://")
        .trim_start_matches("https://")
        .trim_end_matches('/')
        .to_string();
    format!("ws://{}:{}/ws", host, config.get_http_port())
}

fn usage() -> ! {
    eprintln!("Usage: pmopads <broker|renderer|controller> [room]");
    eprintln!();
    eprintln!("  broker              Démarre le broker de rooms (/ws + /health)");
    eprintln!("  renderer [room]     Nœud audio : ouvre le périphérique et joue les pads");
    eprintln!("  controller [room]   Surface de contrôle : pads au clavier (stdin)");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = get_config();

    // RUST_LOG prime sur le niveau configuré
    let default_level = config
        .get_log_min_level()
        .unwrap_or_else(|_| "INFO".to_string());
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mode = std::env::args().nth(1).unwrap_or_else(|| usage());
    let room = std::env::args()
        .nth(2)
        .unwrap_or_else(|| "studio".to_string());

    info!(node_id = %config.get_node_id()?, "Starting PMOPads ({})", mode);

    match mode.as_str() {
        "broker" => broker::run().await?,
        "renderer" => renderer::run(&room).await?,
        "controller" => controller::run(&room).await?,
        _ => usage(),
    }

    Ok(())
}
