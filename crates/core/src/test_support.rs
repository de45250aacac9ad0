// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test builders shared across crates (feature `test-support`).

use crate::worker::Worker;

/// Build a `Worker` with sane defaults, overriding only what a test cares
/// about.
pub struct WorkerBuilder {
    worker: Worker,
}

impl WorkerBuilder {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            worker: Worker {
                hostname: hostname.into(),
                ip: "127.0.0.1".to_string(),
                ssh_port: 22,
                user: "root".to_string(),
                base_path: "/srv/challenges".to_string(),
            },
        }
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.worker.ip = ip.into();
        self
    }

    pub fn build(self) -> Worker {
        self.worker
    }
}
