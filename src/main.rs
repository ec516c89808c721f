//! Gateway daemon
//!
//! Connects to the app server and prints every event as one JSON line on
//! stdout. Logs go to stderr; set `RUST_LOG` to change the level.
//!
//! Usage: `gateway [config.json]`

use std::path::PathBuf;
use std::process::ExitCode;

use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lpwan_gateway::{Config, ConnectionManager, Event};

fn init_logging() {
    // Try RUST_LOG first, then fall back to info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_event(event: &Event) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => warn!(error = %e, "failed to serialize event"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = match Config::load(path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    info!(version = lpwan_gateway::VERSION, peer = %config.peer_addr(), "gateway starting");
    // Subscribe before the manager runs so the first network update is seen
    let (manager, handle) = ConnectionManager::new(config);
    let mut events = handle.subscribe();
    let task = tokio::spawn(manager.run());

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event output fell behind"),
                Err(RecvError::Closed) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!(error = %e, "failed to listen for ctrl-c");
                }
                info!("shutting down");
                if handle.shutdown().await.is_err() {
                    warn!("client already stopped");
                }
                break;
            }
        }
    }

    match task.await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!(error = %e, "client failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "client task panicked");
            ExitCode::FAILURE
        }
    }
}
