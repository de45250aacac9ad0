//! The reconciler / liveness probe (§4.G).
//!
//! Reads authoritative state off the workers and writes it into the
//! durable store, overriding whatever was there before. Triggered inline
//! by every API call (§4.H: "every handler performs a probe before
//! acting") and, separately, by a periodic sweep the daemon drives over
//! every row in `starting`/`running` state (§4.G, the supplemented
//! cadence from §2.2).

use std::sync::Arc;

use futures_util::future::join_all;
use instancer_catalog::{ChallengeSource, ExecContext, ProbeOutcome};
use instancer_core::{InstanceKey, InstanceState, Worker, WorkerRegistry};
use instancer_ssh::RemoteExecutor;
use instancer_store::Store;
use tracing::{instrument, warn};

use crate::context::worker_base_path;
use crate::config::EngineConfig;
use crate::error::LifecycleError;

/// Drives one `(challenge, user)` key's durable state into agreement
/// with what is actually observed on the workers (§4.G).
pub struct Reconciler {
    store: Store,
    registry: Arc<WorkerRegistry>,
    executor: Arc<dyn RemoteExecutor>,
    catalog: Arc<dyn ChallengeSource>,
    config: EngineConfig,
}

impl Reconciler {
    pub fn new(
        store: Store,
        registry: Arc<WorkerRegistry>,
        executor: Arc<dyn RemoteExecutor>,
        catalog: Arc<dyn ChallengeSource>,
        config: EngineConfig,
    ) -> Self {
        Self { store, registry, executor, catalog, config }
    }

    /// Probe every worker in parallel for `key` and persist the
    /// authoritative outcome (§4.G steps 1-5).
    #[instrument(skip(self), fields(key = %key))]
    pub async fn reconcile(&self, key: &InstanceKey) -> Result<(), LifecycleError> {
        if self.store.get(key).await?.is_none() {
            self.store.create(key).await?;
        }
        let Some(challenge) = self.catalog.get(key.challenge_id()) else {
            return Err(LifecycleError::UnknownChallenge(key.challenge_id().to_string()));
        };
        let port = self.store.get_port(key).await?.unwrap_or(0);

        let probes = self.registry.iter().map(|(idx, managed)| {
            let worker: Worker = managed.worker.clone();
            let base_path = worker_base_path(&worker.base_path, &self.config.challenge_root);
            let ctx = ExecContext { base_path: &base_path, user_id: key.user_id(), hostname: &worker.ip, port };
            let cmd = self.catalog.probe_cmd(challenge, &ctx);
            let executor = Arc::clone(&self.executor);
            let timeout = self.config.probe_timeout;
            async move { executor.run(&worker, &cmd, timeout).await.map(|out| (idx, out)) }
        });
        let results: Vec<(usize, String)> = join_all(probes).await.into_iter().flatten().collect();

        // "the first worker whose result is non-empty" (§4.G step 3):
        // registry order, not completion order.
        let authoritative = results
            .iter()
            .min_by_key(|(idx, _)| *idx)
            .cloned();

        let Some((idx, raw)) = authoritative else {
            self.store.set(key, InstanceState::Stopped, "challenge not found on a server").await?;
            return Ok(());
        };

        self.store.set_server(key, idx).await?;
        match self.catalog.interpret_probe(&raw) {
            ProbeOutcome::Running => {
                self.store.set(key, InstanceState::Running, "").await?;
            }
            ProbeOutcome::Stopped => {
                self.store.set(key, InstanceState::Stopped, "").await?;
            }
            ProbeOutcome::Invalid => {
                warn!(%key, "probe output failed to parse");
                self.store.set(key, InstanceState::Failed, "pre-flight test failed to run!").await?;
            }
            ProbeOutcome::Explicit { state, port } => {
                if let Some(port) = port {
                    self.store.set_port(key, port).await?;
                }
                self.store.set(key, state, "").await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use instancer_catalog::fake::FakeSource;
    use instancer_core::test_support::WorkerBuilder;
    use instancer_ssh::fake::FakeExecutor;

    fn key() -> InstanceKey {
        InstanceKey::new("buffer_overflow", "u1").unwrap()
    }

    async fn store() -> Store {
        Store::open_in_memory().await.unwrap()
    }

    fn registry(hosts: &[&str]) -> Arc<WorkerRegistry> {
        Arc::new(WorkerRegistry::new(
            hosts
                .iter()
                .map(|h| WorkerBuilder::new(*h).ip(format!("10.0.0.{h}", h = hash_suffix(h))).build())
                .collect(),
        ))
    }

    fn hash_suffix(name: &str) -> u8 {
        name.bytes().next().unwrap_or(1)
    }

    #[tokio::test]
    async fn no_worker_reports_the_instance_sets_stopped_not_found() {
        let store = store().await;
        let executor = Arc::new(FakeExecutor::new());
        let catalog = Arc::new(FakeSource::single("buffer_overflow", "flag{x}"));
        let reconciler =
            Reconciler::new(store.clone(), registry(&["a"]), executor, catalog, EngineConfig::default());
        reconciler.reconcile(&key()).await.unwrap();
        let row = store.get_row(&key()).await.unwrap().unwrap();
        assert_eq!(row.state, InstanceState::Stopped);
        assert_eq!(row.reason, "challenge not found on a server");
    }

    #[tokio::test]
    async fn authoritative_worker_is_lowest_index_not_first_to_respond() {
        let store = store().await;
        let executor = Arc::new(FakeExecutor::new());
        let catalog = Arc::new(FakeSource::single("buffer_overflow", "flag{x}"));
        executor.set_response("a", "probe buffer_overflow 10.0.0.97 0", Some(r#"{"t":""}"#));
        executor.set_response("b", "probe buffer_overflow 10.0.0.98 0", Some(r#"{"t":""}"#));
        let reconciler = Reconciler::new(
            store.clone(),
            registry(&["a", "b"]),
            executor,
            catalog,
            EngineConfig::default(),
        );
        reconciler.reconcile(&key()).await.unwrap();
        let row = store.get_row(&key()).await.unwrap().unwrap();
        assert_eq!(row.server_idx, Some(0));
        assert_eq!(row.state, InstanceState::Running);
    }

    #[tokio::test]
    async fn invalid_probe_output_sets_failed() {
        let store = store().await;
        let executor = Arc::new(FakeExecutor::new());
        executor.set_response_for_cmd("probe buffer_overflow 10.0.0.97 0", Some("not json"));
        let catalog = Arc::new(FakeSource::single("buffer_overflow", "flag{x}"));
        let reconciler =
            Reconciler::new(store.clone(), registry(&["a"]), executor, catalog, EngineConfig::default());
        reconciler.reconcile(&key()).await.unwrap();
        let row = store.get_row(&key()).await.unwrap().unwrap();
        assert_eq!(row.state, InstanceState::Failed);
        assert_eq!(row.reason, "pre-flight test failed to run!");
    }

    #[tokio::test]
    async fn unknown_challenge_is_an_error() {
        let store = store().await;
        let executor = Arc::new(FakeExecutor::new());
        let catalog = Arc::new(FakeSource::single("other", "flag{x}"));
        let reconciler =
            Reconciler::new(store, registry(&["a"]), executor, catalog, EngineConfig::default());
        assert!(reconciler.reconcile(&key()).await.is_err());
    }
}
