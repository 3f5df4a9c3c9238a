//! Native Host Daemon
//!
//! Boots the backend process under a native host and keeps it running until
//! a shutdown signal arrives or the backend exits.
//!
//! # Usage
//!
//! ```bash
//! # Run the application in the current directory
//! nativehost
//!
//! # Custom application root and backend program
//! nativehost --app-root ~/apps/shop --backend /usr/local/bin/php
//!
//! # With verbose logging
//! RUST_LOG=debug nativehost
//! ```
//!
//! # Environment Variables
//!
//! - `NATIVEHOST_CONFIG`: Configuration file path
//! - `NATIVEHOST_APP_ROOT`, `NATIVEHOST_BACKEND`, `NATIVEHOST_BACKEND_PORT`,
//!   `NATIVEHOST_API_PORT`, `NATIVEHOST_SCHEDULER`: configuration overrides
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)
//!
//! # Signals
//!
//! - SIGTERM/SIGINT: Graceful shutdown (runs quit hooks, stops the backend)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use nativehost_core::{
    load_config_from_path, ConfigOverrides, HostServices, NativeHost, RegistryLoader,
};

/// Native host - runs a backend web application as a desktop program
#[derive(Parser, Debug)]
#[command(name = "nativehost")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "NATIVEHOST_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Application root directory
    #[arg(long, value_name = "PATH")]
    app_root: Option<PathBuf>,

    /// Backend program to launch
    #[arg(long, value_name = "PROGRAM")]
    backend: Option<String>,

    /// Internal API server port
    #[arg(long, value_name = "PORT")]
    api_port: Option<u16>,

    /// Port offered to the backend
    #[arg(long, value_name = "PORT")]
    backend_port: Option<u16>,

    /// Do not run the periodic scheduler
    #[arg(long)]
    no_scheduler: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(ref root) = self.app_root {
            overrides = overrides.with_app_root(root.clone());
        }
        if let Some(ref program) = self.backend {
            overrides = overrides.with_backend_program(program.clone());
        }
        if let Some(port) = self.api_port {
            overrides = overrides.with_api_port(port);
        }
        if let Some(port) = self.backend_port {
            overrides = overrides.with_backend_port(port);
        }
        if self.no_scheduler {
            overrides = overrides.with_scheduler_enabled(false);
        }
        overrides
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("nativehost=info".parse()?)
                .add_directive("nativehost_core=info".parse()?),
        )
        .with_target(true)
        .init();

    info!(pid = std::process::id(), "Starting native host");

    let mut config = load_config_from_path(args.config.clone())
        .context("Failed to load configuration")?;
    args.overrides()
        .apply(&mut config)
        .context("Invalid command-line overrides")?;
    info!(source = %config.source(), app_root = %config.app_root.display(), "Configuration loaded");

    // No script runtime in the daemon: discovered extensions are reported and skipped
    let services = HostServices::headless(Arc::new(RegistryLoader::new()));

    let mut host = NativeHost::boot(config, services)
        .await
        .context("Native host failed to start")?;

    let report = host.report().clone();
    info!(
        backend_port = report.backend_port,
        api = report.api,
        scheduler = report.scheduler,
        "Native host running"
    );

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
        status = host.backend_exited() => {
            warn!(status = ?status, "Backend process exited, shutting down");
        }
    }

    host.shutdown().await;
    info!("Native host stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_map_to_overrides() {
        let args = Args::parse_from([
            "nativehost",
            "--app-root",
            "/srv/app",
            "--backend",
            "php8.3",
            "--api-port",
            "4100",
            "--no-scheduler",
        ]);

        let mut config = nativehost_core::HostConfig::default();
        args.overrides().apply(&mut config).unwrap();

        assert_eq!(config.app_root, PathBuf::from("/srv/app"));
        assert_eq!(config.backend.program, "php8.3");
        assert_eq!(config.api_port, 4100);
        assert!(!config.scheduler.enabled);
    }

    #[test]
    fn test_zero_port_is_rejected() {
        let args = Args::parse_from(["nativehost", "--backend-port", "0"]);
        let mut config = nativehost_core::HostConfig::default();
        assert!(args.overrides().apply(&mut config).is_err());
    }
}
