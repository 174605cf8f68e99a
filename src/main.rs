//! R0N WebSocket echo server.
//!
//! Usage: `r0n-websocket [config.toml]`. Every text or binary message is
//! sent back unchanged. Runs until Ctrl-C.

use r0n_websocket::config::ConfigLoader;
use r0n_websocket::websocket::{Accepted, Event, WebSocketServer};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("R0N WebSocket v{}", env!("CARGO_PKG_VERSION"));

    let loader = ConfigLoader::new();
    let config = match std::env::args().nth(1) {
        Some(path) => loader.load(&path),
        None => loader.load_or_default("r0n-websocket.toml"),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        },
    };

    let mut server = WebSocketServer::new(config);
    if let Err(e) = server.start().await {
        error!(error = %e, "Failed to start server");
        return ExitCode::FAILURE;
    }

    loop {
        tokio::select! {
            accepted = server.accept() => match accepted {
                Some(accepted) => {
                    tokio::spawn(echo(accepted));
                },
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            },
        }
    }

    server.stop().await;
    ExitCode::SUCCESS
}

async fn echo(accepted: Accepted) {
    let Accepted {
        id,
        handle,
        mut events,
        ..
    } = accepted;

    while let Some(event) = events.recv().await {
        match event {
            Event::Message(message) => {
                if handle.send(message).await.is_err() {
                    break;
                }
            },
            Event::ConnectionEnded { code, reason } => {
                info!(id = id, code = ?code, reason = %reason, "Echo session ended");
            },
            Event::TransportError(e) => {
                error!(id = id, error = %e, "Echo session transport error");
            },
        }
    }
}
