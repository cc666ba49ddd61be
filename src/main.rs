//! Chimera Match Server
//!
//! Server binary: registers the requested built-in games and serves the
//! WebSocket endpoint until interrupted.

use std::net::{SocketAddr, ToSocketAddrs};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chimera::backend::{ChimeraServer, WsServer, WsServerConfig};
use chimera::games;
use chimera::protocol::DEFAULT_ADDR;

#[derive(Debug, Parser)]
#[command(name = "chimera-server", version, about = "Game-agnostic multiplayer match server")]
struct Args {
    /// host:port to listen on; a host of "*" binds all interfaces
    #[arg(long, default_value = DEFAULT_ADDR)]
    addrport: String,

    /// Register a built-in game by (optionally path-qualified) type
    /// name, e.g. "ConnectM". May be given multiple times.
    #[arg(long = "load-game", value_name = "NAME")]
    load_game: Vec<String>,

    /// Log filter, e.g. "info" or "chimera=debug"
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn parse_addrport(addrport: &str) -> anyhow::Result<SocketAddr> {
    let (host, port) = addrport
        .rsplit_once(':')
        .context("--addrport must be host:port")?;
    let host = if host == "*" { "0.0.0.0" } else { host };
    let port: u16 = port.parse().with_context(|| format!("invalid port: {port}"))?;
    format!("{host}:{port}")
        .to_socket_addrs()
        .with_context(|| format!("cannot resolve {host}:{port}"))?
        .next()
        .context("address resolved to nothing")
}

#[tokio::main]
async fn serve(server: ChimeraServer, addr: SocketAddr) -> anyhow::Result<()> {
    let ws = WsServer::new(server, WsServerConfig { addr });

    tokio::select! {
        result = ws.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            ws.shutdown();
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    info!("Chimera Server v{}", chimera::VERSION);

    let mut server = ChimeraServer::new();
    for name in &args.load_game {
        let Some((game_id, factory, description)) = games::builtin(name) else {
            eprintln!("ERROR: No such game: {name}");
            return ExitCode::FAILURE;
        };
        server.register_game(&game_id, factory, &description);
    }

    let addr = match parse_addrport(&args.addrport) {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = serve(server, addr) {
        eprintln!("ERROR: {e:#}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
