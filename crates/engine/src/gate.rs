//! The working-set admission gate (§4.D).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

/// Per-challenge mutually-exclusive admission set, keyed by `user_id`
/// (§4.D). An in-memory lock: loss of process state releases every
/// gate, which is acceptable because the durable store is authoritative
/// for final outcomes.
#[derive(Default)]
pub struct WorkingSetGate {
    challenges: Mutex<HashMap<String, Arc<Mutex<HashSet<String>>>>>,
}

impl WorkingSetGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn challenge_set(&self, challenge_id: &str) -> Arc<Mutex<HashSet<String>>> {
        let mut challenges = self.challenges.lock();
        challenges
            .entry(challenge_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(HashSet::new())))
            .clone()
    }

    /// `contains_or_insert(user_id) -> bool`: under a per-challenge
    /// mutex, if `user_id` is present return `false`; otherwise insert
    /// and return `true`. Only the caller that flips the set from
    /// absent to present proceeds.
    pub fn contains_or_insert(&self, challenge_id: &str, user_id: &str) -> bool {
        let set = self.challenge_set(challenge_id);
        let mut set = set.lock();
        if set.contains(user_id) {
            false
        } else {
            set.insert(user_id.to_string());
            true
        }
    }

    /// Called on every exit path of the lifecycle engine.
    pub fn remove(&self, challenge_id: &str, user_id: &str) {
        let set = self.challenge_set(challenge_id);
        set.lock().remove(user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_caller_admits_second_is_rejected() {
        let gate = WorkingSetGate::new();
        assert!(gate.contains_or_insert("buffer_overflow", "u1"));
        assert!(!gate.contains_or_insert("buffer_overflow", "u1"));
    }

    #[test]
    fn different_challenges_do_not_interfere() {
        let gate = WorkingSetGate::new();
        assert!(gate.contains_or_insert("buffer_overflow", "u1"));
        assert!(gate.contains_or_insert("other_challenge", "u1"));
    }

    #[test]
    fn different_users_on_same_challenge_do_not_interfere() {
        let gate = WorkingSetGate::new();
        assert!(gate.contains_or_insert("buffer_overflow", "u1"));
        assert!(gate.contains_or_insert("buffer_overflow", "u2"));
    }

    #[test]
    fn remove_releases_the_gate_for_reuse() {
        let gate = WorkingSetGate::new();
        assert!(gate.contains_or_insert("buffer_overflow", "u1"));
        gate.remove("buffer_overflow", "u1");
        assert!(gate.contains_or_insert("buffer_overflow", "u1"));
    }
}
