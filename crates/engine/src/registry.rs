//! The process-wide background-job registry (§5, §9).
//!
//! `start` and `stop` are launched as background tasks so the API
//! handler can respond immediately while the multi-step lifecycle work
//! continues. Handles are retained here purely so the tasks are not
//! dropped (and thus aborted) before they finish; a completed task
//! removes its own entry via a completion hook.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use instancer_core::InstanceKey;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

#[derive(Default)]
pub struct JobRegistry {
    handles: Mutex<HashMap<InstanceKey, JoinHandle<()>>>,
}

impl JobRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Spawn `fut` as a background task tracked under `key`. If a task
    /// is already tracked under `key` its handle is simply replaced
    /// (the working-set gate guarantees only one start/stop is ever
    /// in flight per key at a time, so this never races with itself).
    pub fn spawn<F>(self: &Arc<Self>, key: InstanceKey, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let this = Arc::clone(self);
        let removal_key = key.clone();
        let handle = tokio::spawn(async move {
            fut.await;
            this.handles.lock().remove(&removal_key);
        });
        self.handles.lock().insert(key, handle);
    }

    /// Number of background jobs currently tracked. Exposed for tests
    /// and for `/healthz`-adjacent diagnostics.
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain every tracked job with a bounded wait, for graceful
    /// shutdown. Jobs still running when `timeout` elapses are left to
    /// finish on their own; the durable store's write-before-next-step
    /// discipline (§5) means no side effect is lost either way.
    pub async fn shutdown(&self, timeout: Duration) {
        let handles: Vec<_> = self.handles.lock().drain().map(|(_, h)| h).collect();
        if handles.is_empty() {
            return;
        }
        let all = futures_util::future::join_all(handles);
        if tokio::time::timeout(timeout, all).await.is_err() {
            warn!("job registry shutdown timed out with jobs still in flight");
        }
    }
}
