//! netdevd
//!
//! Reads `.netdev` definitions, creates the devices through rtnetlink, and
//! keeps stacked devices waiting until the link below them appears.
//!
//! Signals:
//! - `SIGHUP`: reload the configuration directory
//! - `SIGINT`/`SIGTERM`: stop

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use netdevd::daemon::{self, Daemon};
use netdevd::{logging, Config, HostLinks};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    logging::init(&config.log_level, config.log_format)?;

    info!(
        config_dir = %config.config_dir.display(),
        dry_run = config.dry_run,
        once = config.once,
        "Starting netdevd"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (reload_tx, reload_rx) = mpsc::unbounded_channel();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();

    let kernel = daemon::open_kernel(&config, reply_tx)?;
    let daemon = Daemon::new(config.clone(), kernel, Arc::new(HostLinks), reply_rx)?;

    let signals = tokio::spawn(forward_signals(shutdown_tx, reload_tx));

    let snapshot = daemon.run(shutdown_rx, reload_rx).await;
    signals.abort();
    let snapshot = snapshot?;

    if config.once {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    info!("netdevd stopped");
    Ok(())
}

/// Translate process signals into reload and shutdown requests.
async fn forward_signals(shutdown: watch::Sender<bool>, reload: mpsc::UnboundedSender<()>) {
    let (mut hangup, mut terminate) = match (
        signal(SignalKind::hangup()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(hangup), Ok(terminate)) => (hangup, terminate),
        (Err(e), _) | (_, Err(e)) => {
            error!(error = %e, "Failed to install signal handlers");
            let _ = shutdown.send(true);
            return;
        }
    };

    loop {
        tokio::select! {
            _ = hangup.recv() => {
                info!("Received SIGHUP");
                let _ = reload.send(());
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT");
                break;
            }
        }
    }

    let _ = shutdown.send(true);
}
