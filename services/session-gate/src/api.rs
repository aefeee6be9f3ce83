//! Auth endpoints
//!
//! - POST /auth/register  create a credential with the default role
//! - POST /auth/login     exchange identity + secret for a token pair
//! - POST /auth/refresh   rotate a refresh token into a new pair
//! - POST /auth/logout    revoke a refresh token
//! - GET  /auth/me        resolve a bearer access token to its principal

use std::future::Future;
use std::net::SocketAddr;
use std::time::Instant;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::AppState;
use crate::error::ApiError;
use crate::metrics;

/// Register and login body. `sub`/`email` and `password` are accepted as
/// aliases for older clients.
#[derive(Deserialize)]
pub struct CredentialsRequest {
    #[serde(alias = "sub", alias = "email")]
    identity: String,
    #[serde(alias = "password")]
    secret: String,
}

/// Refresh and logout body.
#[derive(Deserialize)]
pub struct RefreshRequest {
    refresh_token: String,
}

pub fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().as_simple())
}

/// Run one auth operation inside a request span and record its metrics.
async fn observe<T, F>(operation: &'static str, request_id: &str, call: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    let span = info_span!("auth", operation, request_id);
    let started = Instant::now();
    let result = call.instrument(span.clone()).await;
    let elapsed = started.elapsed().as_secs_f64();

    let _enter = span.enter();
    let outcome = match &result {
        Ok(_) => "success",
        Err(e) => e.outcome(),
    };
    metrics::record_request(operation, outcome, elapsed);

    match &result {
        Err(ApiError::Session(session::Error::RateLimited)) => metrics::record_rate_limited(),
        Err(e @ ApiError::Session(session::Error::Unavailable(_))) => {
            warn!(error = %e, "auth operation failed on store");
        }
        Err(e @ ApiError::Session(session::Error::Internal(_))) => {
            error!(error = %e, "auth operation failed");
        }
        _ => debug!(outcome, elapsed_secs = elapsed, "auth operation complete"),
    }
    result
}

fn failure(state: &AppState, request_id: &str, err: ApiError) -> Response {
    let retry_after = state.manager.rate_limit_policy().window.as_secs();
    err.into_response_with(request_id, retry_after)
}

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Response {
    let request_id = new_request_id();
    let result = observe("register", &request_id, async {
        let Json(req) = body?;
        state
            .manager
            .register(&req.identity, &req.secret)
            .await
            .map_err(ApiError::from)
    })
    .await;

    match result {
        Ok(()) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "message": "registered" })),
        )
            .into_response(),
        Err(e) => failure(&state, &request_id, e),
    }
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Response {
    let request_id = new_request_id();
    let client_key = state.client_key.resolve(&headers, peer);
    let result = observe("login", &request_id, async {
        let Json(req) = body?;
        state
            .manager
            .login(&req.identity, &req.secret, &client_key)
            .await
            .map_err(ApiError::from)
    })
    .await;

    match result {
        Ok(pair) => (StatusCode::OK, Json(pair)).into_response(),
        Err(e) => failure(&state, &request_id, e),
    }
}

pub async fn refresh(
    State(state): State<AppState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Response {
    let request_id = new_request_id();
    let result = observe("refresh", &request_id, async {
        let Json(req) = body?;
        state
            .manager
            .refresh(&req.refresh_token)
            .await
            .map_err(ApiError::from)
    })
    .await;

    match result {
        Ok(pair) => (StatusCode::OK, Json(pair)).into_response(),
        Err(e) => failure(&state, &request_id, e),
    }
}

pub async fn logout(
    State(state): State<AppState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Response {
    let request_id = new_request_id();
    let result = observe("logout", &request_id, async {
        let Json(req) = body?;
        state
            .manager
            .logout(&req.refresh_token)
            .await
            .map_err(ApiError::from)
    })
    .await;

    match result {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "message": "logged out" })),
        )
            .into_response(),
        Err(e) => failure(&state, &request_id, e),
    }
}

pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let request_id = new_request_id();
    let result = observe("me", &request_id, async {
        let token = bearer_token(&headers).ok_or(ApiError::MissingBearer)?;
        Ok::<_, ApiError>(state.manager.authenticate(token)?)
    })
    .await;

    match result {
        Ok(principal) => (
            StatusCode::OK,
            Json(serde_json::json!({ "sub": principal.subject, "role": principal.role })),
        )
            .into_response(),
        Err(e) => failure(&state, &request_id, e),
    }
}

/// Token from an `Authorization: Bearer <token>` header. The scheme is
/// case-insensitive.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
