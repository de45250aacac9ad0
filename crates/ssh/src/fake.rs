//! A scriptable `RemoteExecutor` for deterministic tests (§2.1 test tooling).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use instancer_core::Worker;
use parking_lot::Mutex;

use crate::RemoteExecutor;

#[derive(Default)]
struct FakeState {
    /// Exact `(hostname, cmd)` responses, checked first.
    by_worker_cmd: HashMap<(String, String), Option<String>>,
    /// Fallback keyed by `cmd` alone, applied to every worker.
    by_cmd: HashMap<String, Option<String>>,
    calls: Vec<(String, String)>,
}

/// An in-memory `RemoteExecutor` whose responses are scripted ahead of
/// time. Unscripted `(worker, cmd)` pairs return `None`, matching the
/// real executor's behavior for an unreachable worker.
#[derive(Default)]
pub struct FakeExecutor {
    state: Mutex<FakeState>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the response for one specific worker and command.
    pub fn set_response(&self, hostname: &str, cmd: &str, response: Option<&str>) {
        self.state
            .lock()
            .by_worker_cmd
            .insert((hostname.to_string(), cmd.to_string()), response.map(str::to_string));
    }

    /// Script the response for a command, applied to any worker without
    /// a more specific `set_response` entry.
    pub fn set_response_for_cmd(&self, cmd: &str, response: Option<&str>) {
        self.state
            .lock()
            .by_cmd
            .insert(cmd.to_string(), response.map(str::to_string));
    }

    /// The `(hostname, cmd)` pairs this fake has been asked to run, in
    /// call order, for assertions on fan-out behavior.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.state.lock().calls.clone()
    }
}

#[async_trait]
impl RemoteExecutor for FakeExecutor {
    async fn run(&self, worker: &Worker, cmd: &str, _timeout: Duration) -> Option<String> {
        let mut state = self.state.lock();
        state.calls.push((worker.hostname.clone(), cmd.to_string()));
        if let Some(resp) = state.by_worker_cmd.get(&(worker.hostname.clone(), cmd.to_string())) {
            return resp.clone();
        }
        state.by_cmd.get(cmd).cloned().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(name: &str) -> Worker {
        Worker {
            hostname: name.to_string(),
            ip: "127.0.0.1".to_string(),
            ssh_port: 22,
            user: "root".to_string(),
            base_path: "/srv".to_string(),
        }
    }

    #[tokio::test]
    async fn unscripted_call_returns_none() {
        let exec = FakeExecutor::new();
        assert_eq!(exec.run(&worker("a"), "echo hi", Duration::from_secs(1)).await, None);
    }

    #[tokio::test]
    async fn per_worker_response_overrides_per_cmd_default() {
        let exec = FakeExecutor::new();
        exec.set_response_for_cmd("loadavg", Some("0.5"));
        exec.set_response("b", "loadavg", Some("0.1"));
        assert_eq!(exec.run(&worker("a"), "loadavg", Duration::from_secs(1)).await.as_deref(), Some("0.5"));
        assert_eq!(exec.run(&worker("b"), "loadavg", Duration::from_secs(1)).await.as_deref(), Some("0.1"));
    }

    #[tokio::test]
    async fn run_all_drops_failures_and_keeps_indices() {
        let exec = FakeExecutor::new();
        exec.set_response("a", "probe", Some("ok"));
        exec.set_response("b", "probe", None);
        let workers = vec![(0, worker("a")), (1, worker("b"))];
        let results = exec.run_all(&workers, "probe", Duration::from_secs(1)).await;
        assert_eq!(results, vec![(0, "ok".to_string())]);
    }

    #[tokio::test]
    async fn calls_are_recorded_in_order() {
        let exec = FakeExecutor::new();
        exec.run(&worker("a"), "one", Duration::from_secs(1)).await;
        exec.run(&worker("a"), "two", Duration::from_secs(1)).await;
        assert_eq!(
            exec.calls(),
            vec![("a".to_string(), "one".to_string()), ("a".to_string(), "two".to_string())]
        );
    }
}
