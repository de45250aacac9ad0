//! Script-backed catalogue loader: `Source/run.sh` / `Source/destroy.sh`
//! / `Tests/main.py`, per §6's worker-side contract.

use std::path::Path;

use serde::Deserialize;
use tracing::instrument;

use crate::challenge::{Challenge, ExecContext};
use crate::error::CatalogError;
use crate::source::ChallengeSource;

#[cfg(test)]
use crate::source::ProbeOutcome;

#[derive(Debug, Deserialize)]
struct Manifest {
    challenge: Vec<Challenge>,
}

/// A catalogue of challenges run via `Source/run.sh` and probed via
/// `Tests/main.py` (§6).
pub struct ScriptSource {
    challenges: Vec<Challenge>,
}

impl ScriptSource {
    /// Load a TOML manifest of `[[challenge]]` entries from
    /// `[docker].challenge_path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let manifest: Manifest = toml::from_str(&raw).map_err(|source| CatalogError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self { challenges: manifest.challenge })
    }

    pub fn from_challenges(challenges: Vec<Challenge>) -> Self {
        Self { challenges }
    }
}

impl ChallengeSource for ScriptSource {
    fn list(&self) -> &[Challenge] {
        &self.challenges
    }

    fn run_cmd(&self, challenge: &Challenge, ctx: &ExecContext<'_>) -> String {
        format!(
            "cd {base}/{path}/Source && ./run.sh --flag {flag} --hostname {host} --port {port}",
            base = ctx.base_path,
            path = challenge.path,
            flag = challenge.flag,
            host = ctx.hostname,
            port = ctx.port,
        )
    }

    fn destroy_cmd(&self, challenge: &Challenge, ctx: &ExecContext<'_>) -> String {
        format!(
            "cd {base}/{path}/Source && ./destroy.sh --port {port}",
            base = ctx.base_path,
            path = challenge.path,
            port = ctx.port,
        )
    }

    fn probe_cmd(&self, challenge: &Challenge, ctx: &ExecContext<'_>) -> String {
        format!(
            "cd {base}/{path}/Tests && python3 main.py --connection-string \"{host} {port}\" --flag={flag} --handout-path ./handout --deployment-path ./deployment",
            base = ctx.base_path,
            path = challenge.path,
            host = ctx.hostname,
            port = ctx.port,
            flag = challenge.flag,
        )
    }

    // sync_cmd: inherits the trait default (None) — script challenges
    // assume workers share a network filesystem with the catalogue path.
}
