//! Artifact Repository Server
//!
//! Main entry point for the repository daemon. Loads the registry
//! configuration, brings the repositories up, reloads on SIGHUP or when the
//! registry file changes, and closes the registry on shutdown.

mod config;
mod telemetry;

use anyhow::{Context, Result};
use artifact_repo_core::{RepositoryEvent, RepositoryEventType};
use artifact_repo_service::{RepositoryRegistry, RepositoryServices};
use artifact_repo_storage::FileConfigurationStore;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::signal;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use config::ServerConfig;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration directory
    #[arg(short, long, env = "CONFIG_DIR", default_value = "config")]
    config_dir: String,

    /// Environment (development, production, etc.)
    #[arg(short, long, env = "ENVIRONMENT", default_value = "development")]
    environment: String,

    /// Persisted registry configuration file
    #[arg(long, env = "REGISTRY_FILE")]
    registry_file: Option<PathBuf>,

    /// Base directory for relative repository locations
    #[arg(long, env = "BASE_DIR")]
    base_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let mut config = ServerConfig::load_or_default(&args.config_dir, &args.environment);

    if let Some(registry_file) = args.registry_file {
        config.registry.registry_file = Some(registry_file);
    }
    if let Some(base_dir) = args.base_dir {
        config.registry.base_dir = base_dir;
    }
    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }

    telemetry::init_with_config(
        telemetry::TelemetryConfig::new()
            .with_log_level(config.logging.level.clone())
            .with_json_format(config.logging.json_format)
            .with_thread_ids(config.logging.include_thread_ids)
            .with_target(config.logging.include_target),
    );

    let registry_file = config.registry.registry_file_path();
    info!("Starting artifact repository server");
    info!("Environment: {}", args.environment);
    info!("Base directory: {}", config.registry.base_dir.display());
    info!("Registry file: {}", registry_file.display());

    let store = Arc::new(FileConfigurationStore::new(&registry_file));
    let services = RepositoryServices::new(store, config.registry.base_dir.clone());
    let registry = services.registry.clone();

    let shutdown = CancellationToken::new();
    let event_logger = tokio::spawn(log_events(registry.subscribe(), shutdown.clone()));

    registry
        .initialize()
        .await
        .context("Failed to initialize repository registry")?;

    let watcher = config.registry.watch_interval_seconds.map(|secs| {
        tokio::spawn(watch_registry_file(
            registry.clone(),
            registry_file.clone(),
            Duration::from_secs(secs.max(1)),
            shutdown.clone(),
        ))
    });

    wait_for_shutdown(&registry).await?;

    let timeout = Duration::from_secs(config.shutdown.timeout_seconds);
    info!("Closing repository registry (timeout {:?})", timeout);
    if tokio::time::timeout(timeout, registry.close()).await.is_err() {
        warn!("Registry did not close within {:?}", timeout);
    }

    shutdown.cancel();
    if let Some(handle) = watcher {
        handle.await.context("Registry file watcher panicked")?;
    }
    event_logger.await.context("Event logger panicked")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Run until SIGINT or SIGTERM, reloading the registry on SIGHUP
async fn wait_for_shutdown(registry: &RepositoryRegistry) -> Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};
        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
        loop {
            tokio::select! {
                res = signal::ctrl_c() => {
                    res.context("Failed to listen for Ctrl+C")?;
                    info!("Received Ctrl+C, starting graceful shutdown");
                    return Ok(());
                }
                _ = terminate.recv() => {
                    info!("Received SIGTERM, starting graceful shutdown");
                    return Ok(());
                }
                _ = hangup.recv() => {
                    info!("Received SIGHUP, reloading repository registry");
                    if let Err(e) = registry.reload().await {
                        error!(error = %e, "Registry reload failed; keeping current repositories");
                    }
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = registry;
        signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C, starting graceful shutdown");
        Ok(())
    }
}

/// Log every lifecycle event until shutdown
async fn log_events(mut events: broadcast::Receiver<RepositoryEvent>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = events.recv() => match received {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Lifecycle event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

fn log_event(event: &RepositoryEvent) {
    let repository = event
        .repository_id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    match event.event_type {
        RepositoryEventType::Updated => info!(
            event = %event.event_type,
            repository = %repository,
            old = event.old_value.as_deref().unwrap_or(""),
            new = event.new_value.as_deref().unwrap_or(""),
            "Repository event"
        ),
        _ => info!(event = %event.event_type, repository = %repository, "Repository event"),
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Reload the registry whenever the registry file's modification time moves
async fn watch_registry_file(
    registry: Arc<RepositoryRegistry>,
    path: PathBuf,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut last = modified(&path);
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let current = modified(&path);
                if current == last {
                    continue;
                }
                debug!(path = %path.display(), "Registry file changed");
                last = current;
                if let Err(e) = registry.reload().await {
                    error!(error = %e, "Registry reload failed; keeping current repositories");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_repo_core::RepositoryId;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["artifact-repo-server"]);
        assert_eq!(args.config_dir, "config");
        assert!(args.registry_file.is_none());
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::parse_from([
            "artifact-repo-server",
            "--registry-file",
            "/etc/artifact-repo/registry.toml",
            "--base-dir",
            "/srv/repos",
        ]);
        assert_eq!(args.registry_file, Some(PathBuf::from("/etc/artifact-repo/registry.toml")));
        assert_eq!(args.base_dir, Some(PathBuf::from("/srv/repos")));
    }

    #[test]
    fn test_modified_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(modified(&dir.path().join("registry.toml")).is_none());
    }

    #[tokio::test]
    async fn test_event_logger_stops_on_cancel() {
        let (tx, rx) = broadcast::channel(4);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(log_events(rx, shutdown.clone()));
        tx.send(RepositoryEvent::new(
            RepositoryEventType::Registered,
            RepositoryId::new("internal").unwrap(),
        ))
        .unwrap();
        shutdown.cancel();
        handle.await.unwrap();
    }
}
