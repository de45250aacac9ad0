// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance key: the `(challenge_id, user_id)` pair that identifies a
//! provisioned copy of a challenge.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

fn segment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z0-9_\-]*$").unwrap_or_else(|e| unreachable!("static regex: {e}"))
    })
}

/// A path segment (challenge id or user id) failed `^[a-z0-9_\-]*$`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid path segment {0:?}: must match ^[a-z0-9_-]*$")]
pub struct KeyError(pub String);

/// Identifies one provisioned instance: a challenge run on behalf of a user.
///
/// Both fields are validated against `^[a-z0-9_\-]*$` at construction time,
/// matching the path-segment constraint the API adapter enforces at the
/// HTTP boundary (§3, §4.H).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceKey {
    challenge_id: String,
    user_id: String,
}

impl InstanceKey {
    pub fn new(challenge_id: impl Into<String>, user_id: impl Into<String>) -> Result<Self, KeyError> {
        let challenge_id = challenge_id.into();
        let user_id = user_id.into();
        validate_segment(&challenge_id)?;
        validate_segment(&user_id)?;
        Ok(Self { challenge_id, user_id })
    }

    pub fn challenge_id(&self) -> &str {
        &self.challenge_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.challenge_id, self.user_id)
    }
}

/// Validates a single path segment (challenge id or user id).
pub fn validate_segment(segment: &str) -> Result<(), KeyError> {
    if segment_pattern().is_match(segment) {
        Ok(())
    } else {
        Err(KeyError(segment.to_string()))
    }
}
