//! HTTP Basic authentication against a single configured credential pair
//! (§6 "Authentication"). `/healthz` is exempt (mounted outside the
//! layer this middleware is attached to).

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use headers::authorization::Basic;
use headers::{Authorization, HeaderMapExt};

use crate::state::AppState;

/// The single `(username, password)` pair loaded from `[api]` (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into() }
    }

    fn matches(&self, basic: &Basic) -> bool {
        basic.username() == self.username && basic.password() == self.password
    }
}

pub async fn require_basic_auth(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .typed_get::<Authorization<Basic>>()
        .is_some_and(|Authorization(basic)| state.credentials.matches(&basic));

    if !authorized {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }
    next.run(request).await
}
