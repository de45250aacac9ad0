//! Compose-backed catalogue loader: one `docker-compose.yml` per
//! challenge, project-named after the user (§4.F alternate backend).

use std::path::Path;

use serde::Deserialize;
use tracing::instrument;

use instancer_core::InstanceState;

use crate::challenge::{Challenge, ExecContext};
use crate::error::CatalogError;
use crate::source::{ChallengeSource, ProbeOutcome};

#[derive(Debug, Deserialize)]
struct Manifest {
    challenge: Vec<Challenge>,
}

/// A catalogue of challenges run via `docker compose`. Each challenge's
/// `path` is the directory (relative to a worker's `base_path`)
/// containing that challenge's `docker-compose.yml`.
pub struct ComposeSource {
    challenges: Vec<Challenge>,
}

impl ComposeSource {
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

    fn compose_file(base_path: &str, challenge: &Challenge) -> String {
        format!("{base_path}/{path}/docker-compose.yml", path = challenge.path)
    }
}

impl ChallengeSource for ComposeSource {
    fn list(&self) -> &[Challenge] {
        &self.challenges
    }

    /// `build` → `down` → `up -d`, chained into one shell invocation —
    /// the state machine treats this as a single `run` step (§4.F).
    fn run_cmd(&self, challenge: &Challenge, ctx: &ExecContext<'_>) -> String {
        let file = Self::compose_file(ctx.base_path, challenge);
        format!(
            "docker compose -p {user} -f {file} build && \
             docker compose -p {user} -f {file} down && \
             docker compose -p {user} -f {file} up -d",
            user = ctx.user_id,
            file = file,
        )
    }

    fn destroy_cmd(&self, challenge: &Challenge, ctx: &ExecContext<'_>) -> String {
        let file = Self::compose_file(ctx.base_path, challenge);
        format!("docker compose -p {user} -f {file} down", user = ctx.user_id, file = file)
    }

    /// `docker compose ps --format json`, filtered to this challenge's
    /// service by the reconciler after parsing (§4.G step 2).
    fn probe_cmd(&self, challenge: &Challenge, ctx: &ExecContext<'_>) -> String {
        let file = Self::compose_file(ctx.base_path, challenge);
        format!("docker compose -p {user} -f {file} ps --format json", user = ctx.user_id, file = file)
    }

    /// `docker compose ps --format json` emits one JSON object per
    /// line; persist `result.State` and the published port directly
    /// (§4.G step 5, §9 "Ports as strings vs integers": `port` is the
    /// source of truth, this is where it is derived from compose).
    fn interpret_probe(&self, raw: &str) -> ProbeOutcome {
        let Some(line) = raw.lines().find(|l| !l.trim().is_empty()) else {
            return ProbeOutcome::Invalid;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
            return ProbeOutcome::Invalid;
        };
        let state = value
            .get("State")
            .and_then(|s| s.as_str())
            .and_then(|s| s.parse::<InstanceState>().ok())
            .unwrap_or(InstanceState::Stopped);
        let port = value
            .get("Publishers")
            .and_then(|p| p.as_array())
            .and_then(|arr| arr.first())
            .and_then(|p0| p0.get("PublishedPort"))
            .and_then(|p| p.as_u64())
            .map(|p| p as u16);
        ProbeOutcome::Explicit { state, port }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge() -> Challenge {
        Challenge {
            id: "web".into(),
            name: "Web".into(),
            path: "web".into(),
            flag: "flag{y}".into(),
            url: "http://{{IP}}:{{PORT}}/".into(),
        }
    }

    fn ctx<'a>() -> ExecContext<'a> {
        ExecContext { base_path: "/srv/challenges", user_id: "u1", hostname: "10.0.0.1", port: 9002 }
    }

    #[test]
    fn run_cmd_chains_build_down_up() {
        let source = ComposeSource::from_challenges(vec![challenge()]);
        let cmd = source.run_cmd(&challenge(), &ctx());
        assert!(cmd.contains("build &&"));
        assert!(cmd.contains("down &&"));
        assert!(cmd.ends_with("up -d"));
        assert!(cmd.contains("-p u1"));
    }

    #[test]
    fn destroy_cmd_is_compose_down() {
        let source = ComposeSource::from_challenges(vec![challenge()]);
        let cmd = source.destroy_cmd(&challenge(), &ctx());
        assert_eq!(
            cmd,
            "docker compose -p u1 -f /srv/challenges/web/docker-compose.yml down"
        );
    }

    #[test]
    fn probe_cmd_requests_json_format() {
        let source = ComposeSource::from_challenges(vec![challenge()]);
        let cmd = source.probe_cmd(&challenge(), &ctx());
        assert!(cmd.contains("ps --format json"));
    }

    #[test]
    fn interpret_probe_reads_state_and_published_port() {
        let source = ComposeSource::from_challenges(vec![challenge()]);
        let raw = r#"{"State":"running","Publishers":[{"PublishedPort":9002}]}"#;
        assert_eq!(
            source.interpret_probe(raw),
            ProbeOutcome::Explicit { state: InstanceState::Running, port: Some(9002) }
        );
    }

    #[test]
    fn interpret_probe_invalid_json_is_invalid() {
        let source = ComposeSource::from_challenges(vec![challenge()]);
        assert_eq!(source.interpret_probe("not json"), ProbeOutcome::Invalid);
    }
}
