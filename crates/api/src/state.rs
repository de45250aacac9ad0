use std::sync::Arc;

use instancer_engine::LifecycleEngine;

use crate::auth::Credentials;

/// Shared Axum application state: the lifecycle engine and the single
/// HTTP Basic credential pair (§6 "Authentication").
#[derive(Clone)]
pub struct AppState {
    pub(crate) engine: Arc<LifecycleEngine>,
    pub(crate) credentials: Credentials,
}

impl AppState {
    pub fn new(engine: Arc<LifecycleEngine>, credentials: Credentials) -> Self {
        Self { engine, credentials }
    }
}
