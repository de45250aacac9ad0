//! Shared helpers for building a [`instancer_catalog::ExecContext`] against
//! one worker.

/// Join a worker's `base_path` with the configured challenge-catalogue
/// root, matching the worker-side contract's `<base_path>/<challenge_path>/`
/// layout (§6).
pub(crate) fn worker_base_path(worker_base_path: &str, challenge_root: &str) -> String {
    format!("{}/{}", worker_base_path.trim_end_matches('/'), challenge_root.trim_matches('/'))
}
