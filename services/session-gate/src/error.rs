//! HTTP error responses
//!
//! Body shape: {"error":{"type":"...","message":"...","request_id":"req_..."}}

use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failures surfaced by the auth endpoints.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] session::Error),

    #[error("missing bearer token")]
    MissingBearer,

    #[error("invalid request body: {message}")]
    InvalidBody { status: StatusCode, message: String },
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidBody {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl ApiError {
    /// Metric outcome label.
    pub fn outcome(&self) -> &'static str {
        match self {
            ApiError::Session(session::Error::Conflict) => "conflict",
            ApiError::Session(session::Error::Unauthorized) | ApiError::MissingBearer => {
                "unauthorized"
            }
            ApiError::Session(session::Error::RateLimited) => "rate_limited",
            ApiError::Session(session::Error::Invalid(_)) => "invalid",
            ApiError::Session(session::Error::Unavailable(_)) => "unavailable",
            ApiError::Session(session::Error::Internal(_)) => "internal",
            ApiError::InvalidBody { .. } => "invalid_request",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Session(session::Error::Conflict) => StatusCode::CONFLICT,
            ApiError::Session(session::Error::Unauthorized)
            | ApiError::Session(session::Error::Invalid(_))
            | ApiError::MissingBearer => StatusCode::UNAUTHORIZED,
            ApiError::Session(session::Error::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Session(session::Error::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Session(session::Error::Internal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InvalidBody { status, .. } => *status,
        }
    }

    /// Client-facing message. Token and store details stay in the logs.
    fn message(&self) -> &str {
        match self {
            ApiError::InvalidBody { message, .. } => message,
            ApiError::Session(session::Error::Conflict) => "identity already registered",
            ApiError::Session(session::Error::Unauthorized) => "invalid credentials",
            ApiError::Session(session::Error::RateLimited) => {
                "too many login attempts, try again later"
            }
            ApiError::Session(session::Error::Invalid(_)) => "invalid or expired access token",
            ApiError::MissingBearer => "missing bearer token",
            ApiError::Session(session::Error::Unavailable(_)) => {
                "service temporarily unavailable"
            }
            ApiError::Session(session::Error::Internal(_)) => "internal error",
        }
    }

    /// Render as a JSON response. `retry_after_secs` is sent with 429s.
    pub fn into_response_with(self, request_id: &str, retry_after_secs: u64) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": {
                "type": self.outcome(),
                "message": self.message(),
                "request_id": request_id,
            }
        });
        let mut response = (
            status,
            [(header::CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response();

        if status == StatusCode::TOO_MANY_REQUESTS {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn taxonomy_maps_to_status_codes() {
        let cases = [
            (ApiError::Session(session::Error::Conflict), StatusCode::CONFLICT),
            (ApiError::Session(session::Error::Unauthorized), StatusCode::UNAUTHORIZED),
            (ApiError::Session(session::Error::RateLimited), StatusCode::TOO_MANY_REQUESTS),
            (
                ApiError::Session(session::Error::Invalid("expired".into())),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ApiError::Session(session::Error::Unavailable("timeout".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::Session(session::Error::Internal("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::MissingBearer, StatusCode::UNAUTHORIZED),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response_with("req_test", 60).status(), expected);
        }
    }

    #[tokio::test]
    async fn rate_limited_carries_retry_after() {
        let response =
            ApiError::Session(session::Error::RateLimited).into_response_with("req_test", 60);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");

        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "rate_limited");
        assert_eq!(json["error"]["request_id"], "req_test");
    }

    #[tokio::test]
    async fn body_rejection_keeps_status_and_envelope() {
        let response = ApiError::InvalidBody {
            status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
            message: "Expected request with `Content-Type: application/json`".into(),
        }
        .into_response_with("req_test", 60);
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "invalid_request");
        assert!(json["error"]["message"].as_str().unwrap().contains("Content-Type"));
    }

    #[tokio::test]
    async fn internal_details_are_not_exposed() {
        let response = ApiError::Session(session::Error::Unavailable(
            "redeem_refresh timed out".into(),
        ))
        .into_response_with("req_test", 60);
        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "unavailable");
        assert!(!json.to_string().contains("redeem_refresh"));
    }
}
