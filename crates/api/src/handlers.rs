//! Route handlers (§4.H, §6).
//!
//! `/start` and `/stop` mirror the original service's response shape:
//! a single-element JSON array, not an object (the original returns a
//! Python set literal such as `{"running"}`, which its framework
//! serializes as `["running"]`). `/status` is a genuine object.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use instancer_core::InstanceKey;
use instancer_core::InstanceState;
use instancer_engine::{StartOutcome, StopOutcome};

use crate::error::ApiError;
use crate::state::AppState;

fn parse_key(user_id: &str, challenge_id: &str) -> Result<InstanceKey, ApiError> {
    InstanceKey::new(challenge_id, user_id).map_err(|_| ApiError::InvalidSegment)
}

fn require_known_challenge(state: &AppState, key: &InstanceKey) -> Result<(), ApiError> {
    if state.engine.catalog().get(key.challenge_id()).is_none() {
        return Err(ApiError::UnknownChallenge(key.challenge_id().to_string()));
    }
    Ok(())
}

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn start(
    State(state): State<AppState>,
    Path((user_id, challenge_id)): Path<(String, String)>,
) -> Response {
    let key = match parse_key(&user_id, &challenge_id) {
        Ok(key) => key,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = require_known_challenge(&state, &key) {
        return err.into_response();
    }

    match state.engine.start(key).await {
        Ok(StartOutcome::Busy) => Json(json!(["still working on it"])).into_response(),
        Ok(StartOutcome::AlreadyRunning) => Json(json!(["running"])).into_response(),
        Ok(StartOutcome::Launched) => Json(json!(["starting"])).into_response(),
        Err(err) => {
            error!(%err, "start failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!(["something went wrong"]))).into_response()
        }
    }
}

pub async fn stop(
    State(state): State<AppState>,
    Path((user_id, challenge_id)): Path<(String, String)>,
) -> Response {
    let key = match parse_key(&user_id, &challenge_id) {
        Ok(key) => key,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = require_known_challenge(&state, &key) {
        return err.into_response();
    }

    match state.engine.stop(key).await {
        Ok(StopOutcome::Busy) => Json(json!(["still working on it"])).into_response(),
        Ok(StopOutcome::NotRunning) => Json(json!(["not running"])).into_response(),
        Ok(StopOutcome::Launched) => Json(json!(["stopping"])).into_response(),
        Err(err) => {
            error!(%err, "stop failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!(["something went wrong"]))).into_response()
        }
    }
}

pub async fn status(
    State(state): State<AppState>,
    Path((user_id, challenge_id)): Path<(String, String)>,
) -> Response {
    let key = match parse_key(&user_id, &challenge_id) {
        Ok(key) => key,
        Err(err) => return err.into_response(),
    };
    if let Err(err) = require_known_challenge(&state, &key) {
        return err.into_response();
    }

    if let Err(err) = state.engine.reconciler().reconcile(&key).await {
        error!(%err, "status reconcile failed");
        return Json(json!({ "state": "failed", "reason": "something went wrong" })).into_response();
    }

    let row = match state.engine.store().get_row(&key).await {
        Ok(row) => row,
        Err(err) => {
            error!(%err, "status lookup failed");
            return Json(json!({ "state": "failed", "reason": "something went wrong" })).into_response();
        }
    };

    let Some(row) = row else {
        return Json(json!({ "state": "not started" })).into_response();
    };

    let mut obj = serde_json::Map::new();
    obj.insert("state".to_string(), json!(row.state.as_str()));

    if row.state == InstanceState::Running {
        if let (Some(idx), Some(port)) = (row.server_idx, row.port) {
            if let Some(managed) = state.engine.registry().get(idx as usize) {
                if let Some(challenge) = state.engine.catalog().get(key.challenge_id()) {
                    obj.insert("url".to_string(), json!(challenge.render_url(&managed.worker.ip, port)));
                }
            }
        }
    }

    if row.state == InstanceState::Failed {
        obj.insert("reason".to_string(), json!(row.reason));
    }

    Json(serde_json::Value::Object(obj)).into_response()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use instancer_catalog::fake::FakeSource;
    use instancer_catalog::ChallengeSource;
    use instancer_core::test_support::WorkerBuilder;
    use instancer_core::WorkerRegistry;
    use instancer_engine::{EngineConfig, JobRegistry, LifecycleEngine, Reconciler, WorkingSetGate};
    use instancer_ssh::fake::FakeExecutor;
    use instancer_store::Store;
    use tower::ServiceExt;

    use crate::auth::Credentials;
    use crate::state::AppState;

    const LOADAVG_CMD: &str = "cat /proc/loadavg | awk '{print $1}'";

    async fn build_state(executor: Arc<FakeExecutor>) -> AppState {
        let store = Store::open_in_memory().await.unwrap();
        let registry = Arc::new(WorkerRegistry::new(vec![WorkerBuilder::new("a").build()]));
        let catalog: Arc<dyn ChallengeSource> = Arc::new(FakeSource::single("buffer_overflow", "flag{x}"));
        let gate = Arc::new(WorkingSetGate::new());
        let jobs = JobRegistry::new();
        let config = EngineConfig::default();
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            Arc::clone(&registry),
            executor.clone(),
            Arc::clone(&catalog),
            config.clone(),
        ));
        let engine = Arc::new(LifecycleEngine::new(
            store, registry, executor, catalog, gate, jobs, reconciler, config,
        ));
        AppState::new(engine, Credentials::new("admin", "hunter2"))
    }

    fn basic_auth_header() -> String {
        format!("Basic {}", base64_encode("admin:hunter2"))
    }

    fn base64_encode(input: &str) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(input)
    }

    #[tokio::test]
    async fn healthz_requires_no_auth() {
        let state = build_state(Arc::new(FakeExecutor::new())).await;
        let router = crate::router(state);
        let response = router
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_reject_missing_credentials() {
        let state = build_state(Arc::new(FakeExecutor::new())).await;
        let router = crate::router(state);
        let response = router
            .oneshot(Request::builder().uri("/status/u1/buffer_overflow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn status_of_unstarted_instance_is_not_started() {
        let state = build_state(Arc::new(FakeExecutor::new())).await;
        let router = crate::router(state);
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/status/u1/buffer_overflow")
                    .header(header::AUTHORIZATION, basic_auth_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({ "state": "not started" }));
    }

    #[tokio::test]
    async fn status_rejects_unknown_challenge_with_404() {
        let state = build_state(Arc::new(FakeExecutor::new())).await;
        let router = crate::router(state);
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/status/u1/no-such-challenge")
                    .header(header::AUTHORIZATION, basic_auth_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn status_rejects_invalid_path_segment_with_422() {
        let state = build_state(Arc::new(FakeExecutor::new())).await;
        let router = crate::router(state);
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/status/U1/buffer_overflow")
                    .header(header::AUTHORIZATION, basic_auth_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn start_returns_a_single_element_array_not_an_object() {
        let executor = Arc::new(FakeExecutor::new());
        executor.set_response_for_cmd(LOADAVG_CMD, Some("0.1"));
        executor.set_response_for_cmd("run buffer_overflow 127.0.0.1 1025", Some("ok"));
        let state = build_state(executor).await;
        let router = crate::router(state);
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/start/u1/buffer_overflow")
                    .header(header::AUTHORIZATION, basic_auth_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!(["starting"]));
    }

    #[tokio::test]
    async fn stop_of_unstarted_instance_is_not_running() {
        let state = build_state(Arc::new(FakeExecutor::new())).await;
        let router = crate::router(state);
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/stop/u1/buffer_overflow")
                    .header(header::AUTHORIZATION, basic_auth_header())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!(["not running"]));
    }
}
