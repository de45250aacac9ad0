//! Tunables the lifecycle engine and reconciler need that don't belong to
//! any single crate below them — timeouts and the catalogue root path.

use std::time::Duration;

/// Per-call timeouts and the catalogue root, threaded through the
/// lifecycle engine and reconciler (§2.1 configuration, §2.2 "graceful vs
/// forced destroy").
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The `[docker].challenge_path` (or `compose_path`) value: the
    /// catalogue root relative to each worker's `base_path`.
    pub challenge_root: String,
    /// Timeout for `run.sh` / compose `build && down && up -d` (§4.F step 7).
    pub run_timeout: Duration,
    /// Timeout for `destroy.sh` / compose `down`, distinct from `run`'s
    /// per §2.2.
    pub destroy_timeout: Duration,
    /// Timeout for the environment-sync pre-step (§2.2).
    pub sync_timeout: Duration,
    /// Per-worker timeout for the liveness probe (§4.G: "a short
    /// per-worker timeout, approximately 1s").
    pub probe_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            challenge_root: String::new(),
            run_timeout: Duration::from_secs(60),
            destroy_timeout: Duration::from_secs(30),
            sync_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(1),
        }
    }
}
