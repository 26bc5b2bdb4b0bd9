//! P2P Signal - Entry Point
//!
//! Minimal front end for the signaling client: connects, sends a ping once
//! the server accepts the connection, and prints every inbound message.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::{error, info, warn};

use p2p_signaling_client::connection::ConnectionPhase;
use p2p_signaling_client::{Config, ConnectionManager, ConnectivityStatus, SignalMessage, VERSION};

/// P2P Signal - signaling channel client
#[derive(Parser)]
#[command(name = "p2p-signal")]
#[command(version = VERSION)]
#[command(about = "Connects to the P2P Transfer signaling server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stay connected and print inbound messages
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "signal-config.toml")]
        config: PathBuf,
        /// Signaling endpoint, overriding the configuration file
        #[arg(short, long, env = "SIGNALING_WS_URL")]
        endpoint: Option<String>,
        /// Payload of the ping sent once connected
        #[arg(short, long, default_value = "hello from p2p-signal")]
        message: String,
    },
    /// Connect, exchange one ping, and disconnect
    TestConnection {
        /// Path to configuration file
        #[arg(short, long, default_value = "signal-config.toml")]
        config: PathBuf,
        /// Signaling endpoint, overriding the configuration file
        #[arg(short, long, env = "SIGNALING_WS_URL")]
        endpoint: Option<String>,
        /// Seconds to wait for each step
        #[arg(short, long, default_value_t = 10)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install the ring crypto provider for wss:// endpoints
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            endpoint,
            message,
        } => run_client(&config, endpoint, message).await,
        Commands::TestConnection {
            config,
            endpoint,
            timeout,
        } => test_connection(&config, endpoint, Duration::from_secs(timeout)).await,
    }
}

fn load_config(config_path: &Path, endpoint: Option<String>) -> Result<Config> {
    let mut config = Config::load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    config.signaling.override_endpoint(endpoint);
    Ok(config)
}

async fn run_client(config_path: &Path, endpoint: Option<String>, message: String) -> Result<()> {
    let config = load_config(config_path, endpoint)?;
    p2p_signaling_client::util::init_tracing(&config.logging)?;

    info!(
        version = VERSION,
        config_path = ?config_path,
        endpoint = ?config.signaling.endpoint(),
        "Starting P2P signal client"
    );

    let manager = ConnectionManager::with_websocket(config.signaling.clone());
    let mut status = manager.subscribe_status();
    let mut inbound = manager.subscribe_messages();

    manager.connect()?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                match current {
                    ConnectivityStatus::Connected => {
                        if let Some(info) = manager.current_connection() {
                            info!(conn_id = %info.id, endpoint = %info.endpoint, "Signaling channel ready");
                        }
                        if let Err(e) = manager.send_message(&SignalMessage::ping(message.as_str())) {
                            warn!(error = %e, "Ping not sent");
                        }
                    }
                    ConnectivityStatus::Disconnected => {
                        warn!("Signaling connection lost");
                        break;
                    }
                }
            }
            received = inbound.recv() => match received {
                Ok(text) => println!("{text}"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Display fell behind inbound messages"),
                Err(RecvError::Closed) => break,
            },
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                manager.disconnect();
                break;
            }
        }

        // A connect that never opened can still end in a close.
        if manager.phase() == ConnectionPhase::Disconnected {
            warn!("Signaling connection closed");
            break;
        }
    }

    let stats = manager.stats();
    info!(
        messages_received = stats.messages_received,
        messages_sent = stats.messages_sent,
        sends_dropped = stats.sends_dropped,
        "Client stopped"
    );
    Ok(())
}

async fn test_connection(config_path: &Path, endpoint: Option<String>, timeout: Duration) -> Result<()> {
    let config = load_config(config_path, endpoint)?;

    p2p_signaling_client::util::init_tracing(&config.logging)?;

    info!(endpoint = ?config.signaling.endpoint(), "Testing connection to signaling server");

    let manager = ConnectionManager::with_websocket(config.signaling.clone());
    let mut inbound = manager.subscribe_messages();
    let status = manager.subscribe_status();

    manager.connect()?;

    if let Err(e) = wait_for_open(&manager, status, timeout).await {
        error!(error = %e, "Connection test failed");
        manager.disconnect();
        return Err(e);
    }
    info!("Connected!");

    manager.send_message(&SignalMessage::ping("connection test"))?;

    let reply = tokio::time::timeout(timeout, inbound.recv()).await;
    manager.disconnect();

    match reply {
        Ok(Ok(text)) => {
            info!(reply = %text, "Connection test successful!");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "Connection test failed");
            Err(e.into())
        }
        Err(_) => {
            // Nothing came back, but the channel did open.
            warn!(?timeout, "No reply within timeout; server accepted the connection");
            Ok(())
        }
    }
}

/// Wait until the transport acknowledges open or the attempt ends
///
/// `status` must be subscribed before `connect` so no change is missed.
async fn wait_for_open(
    manager: &ConnectionManager,
    mut status: watch::Receiver<ConnectivityStatus>,
    timeout: Duration,
) -> Result<()> {
    let outcome = tokio::time::timeout(timeout, async {
        loop {
            if status.borrow_and_update().is_connected() {
                return Ok(());
            }
            // Close-before-open publishes Disconnected again and drops the handle.
            if !manager.has_handle() {
                anyhow::bail!("Signaling server closed the connection");
            }
            status
                .changed()
                .await
                .context("Connection manager went away")?;
        }
    })
    .await;

    match outcome {
        Ok(result) => result,
        Err(_) => anyhow::bail!("Signaling server did not accept the connection within {:?}", timeout),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
