// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! instancerd: the challenge instancer daemon.
//!
//! Wires the durable store, worker registry, remote executor, and
//! challenge catalogue into a `LifecycleEngine`, serves the three HTTP
//! routes of §4.H over it, and drives the background reconciliation
//! sweep of §4.G.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod sweep;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use instancer_api::{AppState, Credentials};
use instancer_catalog::{ChallengeSource, ComposeSource, ScriptSource};
use instancer_core::WorkerRegistry;
use instancer_engine::{EngineConfig, JobRegistry, LifecycleEngine, Reconciler, WorkingSetGate};
use instancer_ssh::{RemoteExecutor, SshExecutor};
use instancer_store::Store;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::{CatalogBackend, Config};

/// How often the background reconciliation sweep (§4.G "periodic"
/// half) runs over every row in `starting`/`running` state.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Bound on how long graceful shutdown waits for in-flight start/stop
/// jobs to finish before giving up on them (§5 "Background task
/// handles").
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Timeout for the non-fatal startup reachability check (§2.2
/// "Health-check loop at startup").
const STARTUP_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = parse_args(std::env::args().skip(1))?;
    let Some(config_path) = config_path else {
        return Ok(());
    };

    setup_logging();

    let config = Config::load(&config_path)?;
    info!(path = %config_path, "configuration loaded");

    let store = Store::open(&config.database_path).await?;
    let registry = Arc::new(WorkerRegistry::new(config.workers.clone()));
    let catalog: Arc<dyn ChallengeSource> = match &config.catalog_backend {
        CatalogBackend::Script(path) => Arc::new(ScriptSource::load(path)?),
        CatalogBackend::Compose(path) => Arc::new(ComposeSource::load(path)?),
    };
    let executor: Arc<dyn RemoteExecutor> =
        Arc::new(SshExecutor::new(config.keyfile.clone(), config.executor_concurrency));

    startup_health_check(&registry, executor.as_ref()).await;

    let gate = Arc::new(WorkingSetGate::new());
    let jobs = JobRegistry::new();
    let engine_config = EngineConfig::default();
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        Arc::clone(&registry),
        Arc::clone(&executor),
        Arc::clone(&catalog),
        engine_config.clone(),
    ));
    let engine = Arc::new(LifecycleEngine::new(
        store.clone(),
        Arc::clone(&registry),
        executor,
        catalog,
        Arc::clone(&gate),
        Arc::clone(&jobs),
        Arc::clone(&reconciler),
        engine_config,
    ));

    let sweep_handle = sweep::spawn(store, Arc::clone(&reconciler), SWEEP_INTERVAL);

    let credentials = Credentials::new(config.api_username, config.api_password);
    let app_state = AppState::new(Arc::clone(&engine), credentials);
    let router = instancer_api::router(app_state);

    let addr = SocketAddr::new(config.bind_ip, config.bind_port);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "instancerd listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down: draining in-flight jobs");
    sweep_handle.abort();
    jobs.shutdown(SHUTDOWN_GRACE).await;
    info!("instancerd stopped");
    Ok(())
}

/// Parse argv into a config file path. Accepts `--help`/`-h` and
/// `--version`/`-v` as information-only flags (handled before any
/// config is touched) and otherwise takes the first positional
/// argument as the TOML config path, defaulting to `instancer.toml`.
fn parse_args(
    mut args: impl Iterator<Item = String>,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    match args.next() {
        None => Ok(Some("instancer.toml".to_string())),
        Some(arg) if arg == "--version" || arg == "-v" => {
            println!("instancerd {}", env!("CARGO_PKG_VERSION"));
            Ok(None)
        }
        Some(arg) if arg == "--help" || arg == "-h" => {
            println!("instancerd {}", env!("CARGO_PKG_VERSION"));
            println!("Usage: instancerd [CONFIG_PATH]");
            println!();
            println!("Runs the challenge instancer, serving /start, /stop, and /status");
            println!("over HTTP Basic auth as configured by CONFIG_PATH (default: instancer.toml).");
            Ok(None)
        }
        Some(path) => Ok(Some(path)),
    }
}

fn setup_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}

/// Non-fatal reachability check over every configured worker at boot
/// (§2.2): logs a warning per unreachable worker without failing
/// startup.
async fn startup_health_check(registry: &WorkerRegistry, executor: &dyn RemoteExecutor) {
    for (idx, managed) in registry.iter() {
        if executor.run(&managed.worker, "true", STARTUP_PROBE_TIMEOUT).await.is_none() {
            warn!(idx, worker = %managed.worker.hostname, "worker unreachable at startup");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut sigterm) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        else {
            return;
        };
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_args_defaults_to_instancer_toml() {
        let result = parse_args(std::iter::empty()).unwrap();
        assert_eq!(result.as_deref(), Some("instancer.toml"));
    }

    #[test]
    fn positional_arg_is_the_config_path() {
        let result = parse_args(std::iter::once("prod.toml".to_string())).unwrap();
        assert_eq!(result.as_deref(), Some("prod.toml"));
    }

    #[test]
    fn help_and_version_short_circuit_with_no_config_path() {
        assert_eq!(parse_args(std::iter::once("--help".to_string())).unwrap(), None);
        assert_eq!(parse_args(std::iter::once("-v".to_string())).unwrap(), None);
    }
}
