// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! instancer-api: the HTTP adapter (§4.H).
//!
//! Maps three authenticated GET routes plus an unauthenticated
//! `/healthz` onto [`instancer_engine::LifecycleEngine`] operations and
//! shapes the fixed JSON envelopes of §6. Nothing in this crate touches
//! a worker or the durable store directly — it only ever talks to the
//! engine.

mod auth;
mod error;
mod handlers;
mod state;

pub use auth::Credentials;
pub use state::AppState;

use axum::middleware;
use axum::routing::get;
use axum::Router;

/// Build the full Axum router: an unauthenticated `/healthz` plus the
/// three Basic-auth-protected challenge routes.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/start/:user_id/:challenge_id", get(handlers::start))
        .route("/stop/:user_id/:challenge_id", get(handlers::stop))
        .route("/status/:user_id/:challenge_id", get(handlers::status))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_basic_auth));

    Router::new().route("/healthz", get(handlers::healthz)).merge(protected).with_state(state)
}
