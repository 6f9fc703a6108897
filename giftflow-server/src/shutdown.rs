//! Signal handling for graceful shutdown and config reload.

use crate::config::ConfigLoader;
use crate::state::AppState;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Notify;

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C).
pub async fn shutdown_signal() {
    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Failed to install signal handlers, falling back to Ctrl+C");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

/// Spawns a task that listens for SIGHUP and reloads the configuration.
///
/// Only the service secret and the payment-validity policy are swapped in
/// place. Provider, engine and sweeper settings need a restart.
///
/// Returns a Notify that can be used to signal when shutdown is complete.
pub fn spawn_config_reload_handler(state: AppState, config_loader: Arc<ConfigLoader>) -> Arc<Notify> {
    let shutdown_notify = Arc::new(Notify::new());
    let shutdown_notify_clone = shutdown_notify.clone();

    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(sighup) => sighup,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGHUP handler, config reload disabled");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    match config_loader.reload() {
                        Ok(loaded_config) => {
                            if *state.config.server.read().await != loaded_config.server {
                                tracing::warn!("Listen address changes take effect on restart");
                            }
                            *state.config.service.write().await = loaded_config.service;
                            *state.config.payment_validity.write().await =
                                loaded_config.payment_validity;
                            tracing::info!("Configuration reloaded successfully");
                        }
                        Err(e) => {
                            tracing::error!("Failed to reload configuration: {}", e);
                        }
                    }
                }
                _ = shutdown_notify_clone.notified() => {
                    tracing::debug!("Config reload handler shutting down");
                    break;
                }
            }
        }
    });

    shutdown_notify
}
