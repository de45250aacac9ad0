// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TOML configuration loading (§6, §2.1) plus the narrow set of
//! environment-variable overrides operators tune per-deployment without
//! editing the file.
//!
//! Parse failures are fatal at startup with a clear diagnostic; nothing
//! here is silently defaulted except the documented env overrides.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use instancer_core::Worker;
use serde::Deserialize;
use thiserror::Error;

/// `INSTANCER_STATE_DIR` overrides `[database].path`'s parent directory.
pub const ENV_STATE_DIR: &str = "INSTANCER_STATE_DIR";
/// `INSTANCER_BIND` overrides `[api].ip`/`port`, formatted `ip:port`.
pub const ENV_BIND: &str = "INSTANCER_BIND";
/// `INSTANCER_EXECUTOR_CONCURRENCY` overrides the SSH executor's
/// bounded worker-pool size.
pub const ENV_EXECUTOR_CONCURRENCY: &str = "INSTANCER_EXECUTOR_CONCURRENCY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("[docker] must set exactly one of compose_path or challenge_path")]
    AmbiguousCatalogBackend,

    #[error("invalid {ENV_BIND} value {0:?}: expected ip:port")]
    InvalidBindOverride(String),

    #[error("invalid {ENV_EXECUTOR_CONCURRENCY} value {0:?}: expected a positive integer")]
    InvalidConcurrencyOverride(String),

    #[error("invalid [api].ip value {0:?}")]
    InvalidIp(String),
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    api: RawApi,
    docker: RawDocker,
    ssh: RawSsh,
    database: RawDatabase,
    servers: RawServers,
}

#[derive(Debug, Deserialize)]
struct RawApi {
    ip: String,
    port: u16,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RawDocker {
    compose_path: Option<String>,
    challenge_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSsh {
    keyfile: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawDatabase {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RawServers {
    default: RawServerDefaults,
    #[serde(flatten)]
    workers: IndexMap<String, RawWorkerOverride>,
}

#[derive(Debug, Deserialize, Clone)]
struct RawServerDefaults {
    port: u16,
    user: String,
    path: String,
}

#[derive(Debug, Deserialize)]
struct RawWorkerOverride {
    ip: String,
    port: Option<u16>,
    user: Option<String>,
    path: Option<String>,
}

/// Which catalogue loader the `[docker]` section selects (§2.1, §9
/// "Catalog loader polymorphism"). The path is the local catalogue
/// manifest to load, not a path on the workers — each challenge entry's
/// own `path` field is what is joined to a worker's `base_path` at
/// dispatch time (see DESIGN.md for this reading of an ambiguous source
/// field).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogBackend {
    Script(PathBuf),
    Compose(PathBuf),
}

/// Fully resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_ip: IpAddr,
    pub bind_port: u16,
    pub api_username: String,
    pub api_password: String,
    pub catalog_backend: CatalogBackend,
    pub keyfile: Option<PathBuf>,
    pub database_path: PathBuf,
    pub workers: Vec<Worker>,
    pub executor_concurrency: usize,
}

impl Config {
    /// Load and validate the TOML file at `path`, then apply the
    /// documented environment-variable overrides from the real process
    /// environment.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::from_file(path)?;
        config.with_env_overrides(&std::env::vars().collect())
    }

    fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

        let catalog_backend = match (raw.docker.compose_path, raw.docker.challenge_path) {
            (Some(path), None) => CatalogBackend::Compose(PathBuf::from(path)),
            (None, Some(path)) => CatalogBackend::Script(PathBuf::from(path)),
            _ => return Err(ConfigError::AmbiguousCatalogBackend),
        };

        let bind_ip = raw
            .api
            .ip
            .parse::<IpAddr>()
            .map_err(|_| ConfigError::InvalidIp(raw.api.ip.clone()))?;

        let workers = raw
            .servers
            .workers
            .into_values()
            .map(|w| Worker {
                hostname: w.ip.clone(),
                ip: w.ip,
                ssh_port: w.port.unwrap_or(raw.servers.default.port),
                user: w.user.unwrap_or_else(|| raw.servers.default.user.clone()),
                base_path: w.path.unwrap_or_else(|| raw.servers.default.path.clone()),
            })
            .collect();

        Ok(Self {
            bind_ip,
            bind_port: raw.api.port,
            api_username: raw.api.username,
            api_password: raw.api.password,
            catalog_backend,
            keyfile: raw.ssh.keyfile,
            database_path: raw.database.path,
            workers,
            executor_concurrency: instancer_ssh::DEFAULT_CONCURRENCY,
        })
    }

    /// Apply `INSTANCER_STATE_DIR` / `INSTANCER_BIND` /
    /// `INSTANCER_EXECUTOR_CONCURRENCY` on top of the parsed file.
    /// Factored out from [`Config::load`] so overrides can be tested
    /// against a synthetic environment map rather than the real process
    /// environment.
    fn with_env_overrides(mut self, env: &HashMap<String, String>) -> Result<Self, ConfigError> {
        if let Some(dir) = env.get(ENV_STATE_DIR) {
            let filename = self
                .database_path
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("instancer.sqlite"));
            self.database_path = PathBuf::from(dir).join(filename);
        }

        if let Some(bind) = env.get(ENV_BIND) {
            let (ip, port) = bind
                .rsplit_once(':')
                .ok_or_else(|| ConfigError::InvalidBindOverride(bind.clone()))?;
            self.bind_ip =
                IpAddr::from_str(ip).map_err(|_| ConfigError::InvalidBindOverride(bind.clone()))?;
            self.bind_port = port
                .parse()
                .map_err(|_| ConfigError::InvalidBindOverride(bind.clone()))?;
        }

        if let Some(concurrency) = env.get(ENV_EXECUTOR_CONCURRENCY) {
            self.executor_concurrency = concurrency
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| ConfigError::InvalidConcurrencyOverride(concurrency.clone()))?;
        }

        Ok(self)
    }
}
