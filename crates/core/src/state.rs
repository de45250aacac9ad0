// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The lifecycle state machine (§4.F).
//!
//! `not_started` is never a variant here — it is the absence of a row in
//! the durable store (§3). Every other recognised value persists.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A persisted instance state. Absence of a row is the eighth, unpersisted
/// state `not_started` (§3, §4.F) and is represented as `Option<InstanceState>`
/// at the store boundary rather than as a variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Created,
    Scheduled,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl InstanceState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Scheduled => "scheduled",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    /// Whether `state = running` requires a placed worker and an allocated
    /// port, per the row invariant in §3.
    pub const fn requires_placement(self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unrecognised state string was read back from the durable store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unrecognised instance state {0:?}")]
pub struct UnknownState(pub String);

impl FromStr for InstanceState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "scheduled" => Ok(Self::Scheduled),
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            "stopped" => Ok(Self::Stopped),
            "failed" => Ok(Self::Failed),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        created = { InstanceState::Created },
        scheduled = { InstanceState::Scheduled },
        starting = { InstanceState::Starting },
        running = { InstanceState::Running },
        stopping = { InstanceState::Stopping },
        stopped = { InstanceState::Stopped },
        failed = { InstanceState::Failed },
    )]
    fn roundtrips_through_str(state: InstanceState) {
        let parsed: InstanceState = state.as_str().parse().unwrap();
        assert_eq!(parsed, state);
    }

    #[test]
    fn unknown_state_errors() {
        assert!("bogus".parse::<InstanceState>().is_err());
    }

    #[test]
    fn only_running_requires_placement() {
        for state in [
            InstanceState::Created,
            InstanceState::Scheduled,
            InstanceState::Starting,
            InstanceState::Stopping,
            InstanceState::Stopped,
            InstanceState::Failed,
        ] {
            assert!(!state.requires_placement());
        }
        assert!(InstanceState::Running.requires_placement());
    }
}
