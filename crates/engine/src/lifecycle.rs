//! The lifecycle engine: `start` and `stop` (§4.F).
//!
//! Every handler probes before acting (§4.H), so both operations begin
//! by reconciling durable state against observed reality. The
//! working-set gate (§4.D) then admits at most one `start`/`stop` per
//! `(challenge, user)` at a time; everyone else is told `Busy`. The
//! admitted caller runs a short synchronous prelude (to answer
//! "already running?" / "nothing to stop?" without a round-trip through
//! a background task) and then hands the rest of the state machine to
//! the job registry (§5, §9) so the HTTP response can return while the
//! multi-step remote work continues.

use std::sync::Arc;

use instancer_catalog::{ChallengeSource, ExecContext};
use instancer_core::{InstanceKey, InstanceState, WorkerRegistry};
use instancer_ssh::RemoteExecutor;
use instancer_store::Store;
use tracing::{info, instrument, warn};

use crate::config::EngineConfig;
use crate::context::worker_base_path;
use crate::error::LifecycleError;
use crate::gate::WorkingSetGate;
use crate::reconciler::Reconciler;
use crate::registry::JobRegistry;

/// What `start()` tells the caller synchronously (§6 `/start` responses).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Another start/stop is already in flight for this key.
    Busy,
    /// The instance was already `running`; nothing was launched.
    AlreadyRunning,
    /// A background start was launched. This rewrite's Open Question
    /// resolution (§9): this response means "launched", not "live" — the
    /// reconciler alone promotes state to `running`.
    Launched,
}

/// What `stop()` tells the caller synchronously (§6 `/stop` responses).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Busy,
    /// No `server_idx` on record; there is nothing to stop.
    NotRunning,
    Launched,
}

/// Drives `(challenge, user)` instances through the state machine of
/// §4.F, persisting every transition through the durable store.
pub struct LifecycleEngine {
    store: Store,
    registry: Arc<WorkerRegistry>,
    executor: Arc<dyn RemoteExecutor>,
    catalog: Arc<dyn ChallengeSource>,
    gate: Arc<WorkingSetGate>,
    jobs: Arc<JobRegistry>,
    reconciler: Arc<Reconciler>,
    config: EngineConfig,
}

impl LifecycleEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        registry: Arc<WorkerRegistry>,
        executor: Arc<dyn RemoteExecutor>,
        catalog: Arc<dyn ChallengeSource>,
        gate: Arc<WorkingSetGate>,
        jobs: Arc<JobRegistry>,
        reconciler: Arc<Reconciler>,
        config: EngineConfig,
    ) -> Self {
        Self { store, registry, executor, catalog, gate, jobs, reconciler, config }
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn registry(&self) -> &Arc<WorkerRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> &Arc<dyn ChallengeSource> {
        &self.catalog
    }

    pub fn gate(&self) -> &Arc<WorkingSetGate> {
        &self.gate
    }

    /// `start` (§4.F). Probes first, then admits through the gate, then
    /// runs the fast prelude of step 1 synchronously before handing the
    /// rest of the sequence to a background job.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn start(self: &Arc<Self>, key: InstanceKey) -> Result<StartOutcome, LifecycleError> {
        self.reconciler.reconcile(&key).await?;

        if !self.gate.contains_or_insert(key.challenge_id(), key.user_id()) {
            return Ok(StartOutcome::Busy);
        }

        match self.store.get(&key).await? {
            Some(InstanceState::Running) => {
                self.gate.remove(key.challenge_id(), key.user_id());
                return Ok(StartOutcome::AlreadyRunning);
            }
            Some(InstanceState::Failed) => {
                self.store.set(&key, InstanceState::Scheduled, "").await?;
            }
            None => {
                self.store.create(&key).await?;
            }
            Some(_) => {
                // Retry a previously-interrupted start (§4.F step 1).
            }
        }

        let engine = Arc::clone(self);
        let job_key = key.clone();
        self.jobs.spawn(key, async move {
            engine.run_start(job_key).await;
        });
        Ok(StartOutcome::Launched)
    }

    /// Steps 2-8 of the start sequence, run as a background job.
    async fn run_start(&self, key: InstanceKey) {
        let result = self.run_start_inner(&key).await;
        if let Err(err) = result {
            warn!(%key, %err, "start failed");
        }
        self.gate.remove(key.challenge_id(), key.user_id());
    }

    async fn run_start_inner(&self, key: &InstanceKey) -> Result<(), LifecycleError> {
        // Step 2: set `starting`.
        self.store.set(key, InstanceState::Starting, "").await?;

        // Step 3: pick a worker.
        let Some(idx) = crate::scheduler::pick_worker(&self.registry, self.executor.as_ref()).await else {
            self.store.set(key, InstanceState::Failed, "no server available").await?;
            return Ok(());
        };

        // Step 4: record server_idx.
        self.store.set_server(key, idx).await?;

        let Some(managed) = self.registry.get(idx) else {
            // pick_worker only ever returns indices it just iterated.
            self.store.set(key, InstanceState::Failed, "no server available").await?;
            return Ok(());
        };

        // Step 5: allocate a port, bounded (§4.B redesign flag).
        let Some(port) = managed.ports.lock().alloc() else {
            self.store.set(key, InstanceState::Failed, "no server available").await?;
            return Ok(());
        };
        self.store.set_port(key, port).await?;

        let Some(challenge) = self.catalog.get(key.challenge_id()) else {
            self.store.set(key, InstanceState::Failed, "unknown challenge").await?;
            return Ok(());
        };
        let base_path = worker_base_path(&managed.worker.base_path, &self.config.challenge_root);
        let ctx = ExecContext {
            base_path: &base_path,
            user_id: key.user_id(),
            hostname: &managed.worker.ip,
            port,
        };

        // Step 6: environment-sync pre-step (§2.2) - failure is tolerated.
        if let Some(sync_cmd) = self.catalog.sync_cmd(challenge, &ctx) {
            if self.executor.run(&managed.worker, &sync_cmd, self.config.sync_timeout).await.is_none() {
                warn!(%key, "environment sync failed; proceeding with run anyway");
            }
        }

        // Step 7: run.
        let run_cmd = self.catalog.run_cmd(challenge, &ctx);
        if self.executor.run(&managed.worker, &run_cmd, self.config.run_timeout).await.is_none() {
            self.store.set(key, InstanceState::Failed, "starting run.sh failed").await?;
            return Ok(());
        }

        // Step 8: state is left `starting`; the reconciler promotes it
        // to `running` once the probe succeeds.
        info!(%key, "start launched");
        Ok(())
    }

    /// `stop` (§4.F).
    #[instrument(skip(self), fields(key = %key))]
    pub async fn stop(self: &Arc<Self>, key: InstanceKey) -> Result<StopOutcome, LifecycleError> {
        self.reconciler.reconcile(&key).await?;

        if !self.gate.contains_or_insert(key.challenge_id(), key.user_id()) {
            return Ok(StopOutcome::Busy);
        }

        let Some(idx) = self.store.get_server(&key).await? else {
            self.gate.remove(key.challenge_id(), key.user_id());
            return Ok(StopOutcome::NotRunning);
        };

        self.store.set(&key, InstanceState::Stopping, "").await?;

        let engine = Arc::clone(self);
        let job_key = key.clone();
        self.jobs.spawn(key, async move {
            engine.run_stop(job_key, idx).await;
        });
        Ok(StopOutcome::Launched)
    }

    async fn run_stop(&self, key: InstanceKey, idx: usize) {
        if let Err(err) = self.run_stop_inner(&key, idx).await {
            warn!(%key, %err, "stop encountered a store error");
        }
        // Step 5: release gate unconditionally - we prefer forgetting
        // over leaking state (§4.F Stop step 2).
        let _ = self.store.delete(&key).await;
        self.gate.remove(key.challenge_id(), key.user_id());
    }

    async fn run_stop_inner(&self, key: &InstanceKey, idx: usize) -> Result<(), LifecycleError> {
        let port = self.store.get_port(key).await?;

        if let Some(managed) = self.registry.get(idx) {
            if let Some(challenge) = self.catalog.get(key.challenge_id()) {
                let base_path = worker_base_path(&managed.worker.base_path, &self.config.challenge_root);
                let ctx = ExecContext {
                    base_path: &base_path,
                    user_id: key.user_id(),
                    hostname: &managed.worker.ip,
                    port: port.unwrap_or(0),
                };
                let destroy_cmd = self.catalog.destroy_cmd(challenge, &ctx);
                // Errors/timeouts during destroy are logged but never
                // block row deletion (§4.F Stop step 2). The executor
                // contract (§4.C) collapses timeout and command failure
                // to the same `None`, so a single reason covers both —
                // see DESIGN.md for this tradeoff.
                if self.executor.run(&managed.worker, &destroy_cmd, self.config.destroy_timeout).await.is_none()
                {
                    warn!(%key, worker = %managed.worker.hostname, "destroy.sh failed or timed out");
                }
            }
            if let Some(port) = port {
                managed.ports.lock().free(port);
            }
        }
        Ok(())
    }
}
