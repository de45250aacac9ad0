// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The background reconciliation sweep (§4.G, the periodic half of the
//! trigger the distilled spec names but leaves the cadence for — made
//! concrete here per SPEC_FULL.md §4.G).

use std::sync::Arc;
use std::time::Duration;

use instancer_core::InstanceState;
use instancer_engine::Reconciler;
use instancer_store::Store;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Spawn a task that, every `interval`, reconciles every instance
/// currently in `starting` or `running` state — the rows nobody is
/// actively polling via `/status`.
pub fn spawn(store: Store, reconciler: Arc<Reconciler>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick fires immediately; skip it so the sweep doesn't
        // duplicate the reconciliation every inline handler already did
        // moments after startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            run_once(&store, &reconciler).await;
        }
    })
}

async fn run_once(store: &Store, reconciler: &Reconciler) {
    let keys = match store.list_in_states(&[InstanceState::Starting, InstanceState::Running]).await {
        Ok(keys) => keys,
        Err(err) => {
            warn!(%err, "background sweep failed to list in-flight instances");
            return;
        }
    };
    debug!(count = keys.len(), "background sweep starting");
    for key in keys {
        if let Err(err) = reconciler.reconcile(&key).await {
            warn!(%key, %err, "background sweep reconcile failed");
        }
    }
}
