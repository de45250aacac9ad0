//! A minimal in-memory `ChallengeSource` for engine/API tests.

use crate::challenge::{Challenge, ExecContext};
use crate::source::ChallengeSource;

pub struct FakeSource {
    challenges: Vec<Challenge>,
}

impl FakeSource {
    pub fn new(challenges: Vec<Challenge>) -> Self {
        Self { challenges }
    }

    pub fn single(id: &str, flag: &str) -> Self {
        Self::new(vec![Challenge {
            id: id.to_string(),
            name: id.to_string(),
            path: id.to_string(),
            flag: flag.to_string(),
            url: "http://{{IP}}:{{PORT}}/".to_string(),
        }])
    }
}

impl ChallengeSource for FakeSource {
    fn list(&self) -> &[Challenge] {
        &self.challenges
    }

    fn run_cmd(&self, challenge: &Challenge, ctx: &ExecContext<'_>) -> String {
        format!("run {} {} {}", challenge.id, ctx.hostname, ctx.port)
    }

    fn destroy_cmd(&self, challenge: &Challenge, ctx: &ExecContext<'_>) -> String {
        format!("destroy {} {}", challenge.id, ctx.port)
    }

    fn probe_cmd(&self, challenge: &Challenge, ctx: &ExecContext<'_>) -> String {
        format!("probe {} {} {}", challenge.id, ctx.hostname, ctx.port)
    }
}
