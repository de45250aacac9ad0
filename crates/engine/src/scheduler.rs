//! The placement scheduler (§4.E).

use std::time::Duration;

use instancer_core::{Worker, WorkerRegistry};
use instancer_ssh::RemoteExecutor;
use tracing::debug;

/// Default per-worker timeout for the loadavg probe used during
/// placement. Deliberately short: an unresponsive worker should not
/// stall scheduling a start.
pub const LOADAVG_TIMEOUT: Duration = Duration::from_secs(2);

const LOADAVG_CMD: &str = "cat /proc/loadavg | awk '{print $1}'";

/// `pick_worker()` (§4.E): probes every worker's load average in
/// parallel, drops non-responders, and returns the index of the
/// least-loaded reachable worker. `None` if every worker is
/// unreachable — the caller treats that as placement starvation (§4.F
/// step 3, §7).
///
/// Placement is stateless and carries no capacity model; it is
/// re-evaluated on every start. Ties are broken by first-found.
pub async fn pick_worker(registry: &WorkerRegistry, executor: &dyn RemoteExecutor) -> Option<usize> {
    let workers: Vec<(usize, Worker)> =
        registry.iter().map(|(idx, managed)| (idx, managed.worker.clone())).collect();
    if workers.is_empty() {
        return None;
    }
    let results = executor.run_all(&workers, LOADAVG_CMD, LOADAVG_TIMEOUT).await;

    let mut best: Option<(usize, f64)> = None;
    for (idx, stdout) in results {
        let Ok(load) = stdout.trim().parse::<f64>() else {
            debug!(idx, stdout, "loadavg output was not a number, skipping");
            continue;
        };
        match best {
            Some((_, best_load)) if load >= best_load => {}
            _ => best = Some((idx, load)),
        }
    }
    best.map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use instancer_core::Worker;
    use instancer_ssh::fake::FakeExecutor;

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
    async fn picks_the_least_loaded_reachable_worker() {
        let registry = WorkerRegistry::new(vec![worker("a"), worker("b"), worker("c")]);
        let executor = FakeExecutor::new();
        executor.set_response("a", LOADAVG_CMD, Some("1.5"));
        executor.set_response("b", LOADAVG_CMD, Some("0.2"));
        executor.set_response("c", LOADAVG_CMD, Some("0.9"));
        let chosen = pick_worker(&registry, &executor).await;
        assert_eq!(chosen, Some(1));
    }

    #[tokio::test]
    async fn drops_unreachable_workers() {
        let registry = WorkerRegistry::new(vec![worker("a"), worker("b")]);
        let executor = FakeExecutor::new();
        executor.set_response("a", LOADAVG_CMD, None);
        executor.set_response("b", LOADAVG_CMD, Some("0.2"));
        assert_eq!(pick_worker(&registry, &executor).await, Some(1));
    }

    #[tokio::test]
    async fn all_unreachable_yields_none() {
        let registry = WorkerRegistry::new(vec![worker("a"), worker("b")]);
        let executor = FakeExecutor::new();
        assert_eq!(pick_worker(&registry, &executor).await, None);
    }

    #[tokio::test]
    async fn empty_registry_yields_none() {
        let registry = WorkerRegistry::new(vec![]);
        let executor = FakeExecutor::new();
        assert_eq!(pick_worker(&registry, &executor).await, None);
    }
}
