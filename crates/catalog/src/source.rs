use instancer_core::InstanceState;

use crate::challenge::{Challenge, ExecContext};

/// What the reconciler should do with one worker's probe output (§4.G
/// step 5). The script backend only ever reports `Running`/`Stopped`/
/// `Invalid`; the compose backend additionally knows its own published
/// port and reports the container's literal state string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Running,
    Stopped,
    /// The probe ran but its output could not be parsed (§4.G: "if JSON
    /// invalid -> failed, 'pre-flight test failed to run!'").
    Invalid,
    /// The compose backend reports its own state and published port
    /// directly rather than a boolean health check.
    Explicit { state: InstanceState, port: Option<u16> },
}

/// The pluggable catalogue capability (§9 "Catalog loader polymorphism").
///
/// Two concrete loaders exist — [`crate::script::ScriptSource`] and
/// [`crate::compose::ComposeSource`] — mirroring the two run-command
/// backends described in §4.F. The rest of the system is agnostic to
/// which is configured; it only ever talks to this trait.
pub trait ChallengeSource: Send + Sync {
    fn list(&self) -> &[Challenge];

    fn get(&self, id: &str) -> Option<&Challenge> {
        self.list().iter().find(|c| c.id == id)
    }

    /// The `run` command template (§4.F step 7), fully substituted.
    fn run_cmd(&self, challenge: &Challenge, ctx: &ExecContext<'_>) -> String;

    /// The `destroy` command template (§4.F Stop step 2), fully
    /// substituted.
    fn destroy_cmd(&self, challenge: &Challenge, ctx: &ExecContext<'_>) -> String;

    /// The probe command template (§4.G step 2), fully substituted.
    fn probe_cmd(&self, challenge: &Challenge, ctx: &ExecContext<'_>) -> String;

    /// The environment-sync pre-step (§2.2). `None` means the loader
    /// treats sync as a no-op (the common case: workers share a network
    /// filesystem).
    fn sync_cmd(&self, challenge: &Challenge, ctx: &ExecContext<'_>) -> Option<String> {
        let _ = (challenge, ctx);
        None
    }

    /// Interpret one worker's raw probe stdout (§4.G step 5). The
    /// default implementation is the script backend's JSON-object
    /// convention: a JSON object whose values are all empty strings
    /// means healthy; any other valid JSON means stopped; invalid JSON
    /// means the probe itself is broken.
    fn interpret_probe(&self, raw: &str) -> ProbeOutcome {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Object(map)) => {
                if map.values().all(|v| v.as_str() == Some("")) {
                    ProbeOutcome::Running
                } else {
                    ProbeOutcome::Stopped
                }
            }
            Ok(_) => ProbeOutcome::Stopped,
            Err(_) => ProbeOutcome::Invalid,
        }
    }
}
