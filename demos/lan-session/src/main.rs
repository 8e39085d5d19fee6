//! Host or join a session on the local network.
//!
//! ```text
//! lan-session host [listen-addr] [name]
//! lan-session join <host-addr> [name]
//! ```
//!
//! Logging follows `RUST_LOG` (default `info`). Ctrl-C leaves the session.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tether::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "0.0.0.0:7777";

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "lan-session", about = "Host or join a session on the local network")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Cmd {
    /// Listen for players
    Host {
        /// Address to listen on
        #[arg(default_value = DEFAULT_ADDR)]
        listen: String,
        /// Display name
        #[arg(default_value = "host")]
        name: String,
    },
    /// Connect to a host
    Join {
        /// Host address
        addr: String,
        /// Display name
        #[arg(default_value = "guest")]
        name: String,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let (events_tx, events_rx) = event_channel();
    let transport = Arc::new(WebSocketTransport::new(events_tx));
    let directory = match &cli.cmd {
        Cmd::Host { listen, .. } => DirectAddressDirectory::new(listen.as_str()),
        Cmd::Join { addr, .. } => DirectAddressDirectory::new(addr.as_str()),
    };
    let handle = ConnectionManagerBuilder::new()
        .session_name("lan")
        .build(transport, Arc::new(directory), events_rx)
        .spawn();

    let mut status = handle.subscribe_status();
    let mut peers = handle.subscribe_peers();
    let mut reconnects = handle.subscribe_reconnects();

    match cli.cmd {
        Cmd::Host { name, .. } => handle.start_as_host(name).await?,
        Cmd::Join { name, .. } => handle.start_as_client(name).await?,
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("leaving session");
                handle.request_shutdown().await?;
                break;
            }
            Ok(s) = status.recv() => {
                println!("status: {s}");
                if s.is_terminal() {
                    break;
                }
            }
            Ok(event) = peers.recv() => {
                let name = event.display_name.as_deref().unwrap_or("?");
                println!("peer {} ({name}): {}", event.peer, event.status);
                let players = handle.connected_players().await?;
                println!("{} player(s) connected", players.len());
            }
            Ok(progress) = reconnects.recv() => {
                println!("reconnecting, attempt {}/{}", progress.attempt, progress.max);
            }
        }
    }
    Ok(())
}
