use anyhow::Context;
use clap::Parser;
use std::fs;
use tokio::signal;

use chatmesh::{
    config::Config,
    constants::*,
    network::{self, Hub},
};

#[derive(Parser, Debug)]
#[command(author, version, about = "ChatMesh relay node")]
struct Args {
    /// Optional path to config file (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Port accepting local client connections (overrides config)
    #[arg(long)]
    client_port: Option<u16>,

    /// Port accepting inbound peer links (overrides config)
    #[arg(long)]
    peer_port: Option<u16>,

    /// Node identity (overrides config / persisted id)
    #[arg(long)]
    id: Option<String>,

    /// Peer address to dial at startup (host:port); repeatable
    #[arg(long = "peer")]
    peers: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| "config.toml".to_string());
    let mut config = match fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str::<Config>(&content) {
            Ok(cfg) => {
                println!("{}Loaded config from: {}", ICON_PLACEHOLDER, config_path);
                cfg
            }
            Err(err) => {
                anyhow::bail!("failed to parse config file '{}': {}", config_path, err);
            }
        },
        Err(_) => {
            println!(
                "⚠️ No config file found at '{}', falling back to default config.",
                config_path
            );
            Config::default()
        }
    };

    // CLI overrides take precedence over the config file.
    if let Some(p) = args.client_port {
        config.client_port = p;
    }
    if let Some(p) = args.peer_port {
        config.peer_port = p;
    }
    if let Some(id) = args.id.clone() {
        let mut node = config.node.take().unwrap_or_default();
        node.id = Some(id);
        config.node = Some(node);
    }
    if !args.peers.is_empty() {
        config.peers = Some(args.peers.clone());
    }

    // Initialize events AFTER config is loaded so a custom log path applies
    if let Some(log_cfg) = config.logging.as_ref() {
        chatmesh::events::init_events_from_config(Some(log_cfg)).await;
    } else {
        chatmesh::events::init_default_events().await;
    }

    let node_id = config
        .node
        .as_ref()
        .map(|n| n.resolve_node_id())
        .unwrap_or_else(|| "unknown-node".to_string());
    println!("{}Node identity resolved: {}", ICON_PLACEHOLDER, node_id);
    {
        use chatmesh::events::{
            dispatcher,
            model::{LogEvent, LogLevel, SystemEvent},
        };
        let mut meta = dispatcher::meta("node", LogLevel::Info);
        meta.corr_id = Some(dispatcher::correlation_id());
        dispatcher::emit(LogEvent::System(SystemEvent {
            meta,
            action: "identity_resolved".into(),
            detail: Some(format!("id={} version={}", node_id, full_version())),
        }));
    }

    let dial_targets = config.peers.clone().unwrap_or_default();
    let hub = Hub::new(&node_id, dial_targets);

    // Failing to bind either listener is the one unrecoverable startup error.
    let client_listener = network::bind(&format!("0.0.0.0:{}", config.client_port))
        .await
        .with_context(|| format!("cannot bind client listener on port {}", config.client_port))?;
    let peer_listener = network::bind(&format!("0.0.0.0:{}", config.peer_port))
        .await
        .with_context(|| format!("cannot bind peer listener on port {}", config.peer_port))?;

    tokio::spawn(network::run_client_listener(client_listener, hub.clone()));
    tokio::spawn(network::run_peer_listener(peer_listener, hub.clone()));

    network::connect_to_peers(&hub);

    println!(
        "🟢 {} node '{}' is running (clients :{}, peers :{}). Press Ctrl+C to shut down...",
        DEFAULT_APP_NAME, node_id, config.client_port, config.peer_port
    );

    signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    println!("🛑 {} shutting down gracefully.", DEFAULT_APP_NAME);
    hub.shutdown().await;
    Ok(())
}
