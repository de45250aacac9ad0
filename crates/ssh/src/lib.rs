// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! instancer-ssh: the remote-command executor (§4.C).
//!
//! `RemoteExecutor` runs a shell command on one worker, or fans the same
//! command out to many workers in parallel, under a caller-supplied
//! deadline. Every failure mode — transport error, non-zero exit,
//! timeout — collapses to `None`; the executor never interprets
//! stdout, that is the lifecycle engine's job.
//!
//! The reference transport opens a fresh SSH session per call (connect,
//! run one command, close) rather than keeping a session warm between
//! calls. That keeps the executor stateless at the cost of per-call
//! connect latency — a deliberate simplicity-over-latency tradeoff
//! (see DESIGN.md).

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use instancer_core::Worker;
use openssh::{KnownHosts, SessionBuilder};
use tokio::sync::Semaphore;
use tracing::{instrument, warn};

/// Default bound on concurrent in-flight SSH sessions when none is
/// configured (`INSTANCER_EXECUTOR_CONCURRENCY`, §6).
pub const DEFAULT_CONCURRENCY: usize = 16;

pub use error::ExecError;

/// The remote-command executor contract described in §4.C.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `cmd` on `worker`. Returns the trimmed stdout on success,
    /// `None` on any failure (transport error, non-zero exit, timeout).
    async fn run(&self, worker: &Worker, cmd: &str, timeout: Duration) -> Option<String>;

    /// Run `cmd` on every worker in `workers`, in parallel, waiting for
    /// all to finish or time out. Only successful entries are retained,
    /// paired with the caller-supplied index (typically the worker's
    /// position in the registry).
    async fn run_all(
        &self,
        workers: &[(usize, Worker)],
        cmd: &str,
        timeout: Duration,
    ) -> Vec<(usize, String)> {
        let futures = workers.iter().map(|(idx, worker)| {
            let idx = *idx;
            async move { self.run(worker, cmd, timeout).await.map(|out| (idx, out)) }
        });
        join_all(futures).await.into_iter().flatten().collect()
    }
}

/// SSH-backed `RemoteExecutor`. Opens a fresh session per `run()` call.
///
/// Session setup and process exit are blocking-ish work, so concurrent
/// calls are bounded by a semaphore (§5) rather than left to run
/// unbounded across the whole worker pool.
pub struct SshExecutor {
    keyfile: Option<PathBuf>,
    slots: Arc<Semaphore>,
}

impl SshExecutor {
    pub fn new(keyfile: Option<PathBuf>, concurrency: usize) -> Self {
        Self { keyfile, slots: Arc::new(Semaphore::new(concurrency.max(1))) }
    }

    fn destination(worker: &Worker) -> String {
        format!("ssh://{}@{}:{}", worker.user, worker.ip, worker.ssh_port)
    }

    #[instrument(skip(self, cmd), fields(worker = %worker.hostname))]
    async fn run_inner(
        &self,
        worker: &Worker,
        cmd: &str,
        timeout: Duration,
    ) -> Result<String, ExecError> {
        let destination = Self::destination(worker);
        let keyfile = self.keyfile.clone();
        let cmd = cmd.to_string();

        let attempt = async move {
            let mut builder = SessionBuilder::default();
            builder.known_hosts_check(KnownHosts::Accept);
            if let Some(keyfile) = &keyfile {
                builder.keyfile(keyfile);
            }
            let session = builder.connect(&destination).await?;
            let output = session.command("sh").arg("-c").arg(&cmd).output().await?;
            let _ = session.close().await;
            if !output.status.success() {
                return Err(ExecError::NonZeroExit(output.status));
            }
            String::from_utf8(output.stdout).map_err(|_| ExecError::InvalidUtf8)
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result.map(|s| s.trim().to_string()),
            Err(_) => Err(ExecError::Timeout(timeout)),
        }
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, worker: &Worker, cmd: &str, timeout: Duration) -> Option<String> {
        let Ok(_permit) = self.slots.acquire().await else {
            // The semaphore is never closed; this arm is unreachable in practice.
            return None;
        };
        match self.run_inner(worker, cmd, timeout).await {
            Ok(stdout) => Some(stdout),
            Err(err) => {
                warn!(worker = %worker.hostname, %err, "remote command failed");
                None
            }
        }
    }
}
