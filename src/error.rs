//! Error taxonomy shared by every component.
//!
//! One sum type for domain errors (§7 of the spec this crate implements),
//! mapped to HTTP status + body at the axum boundary. Driver- and
//! store-specific errors convert into this type via `#[from]` so call
//! sites can use `?` all the way up to the handler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("gone: {0}")]
    Gone(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream platform error ({code}): {message}")]
    Upstream { code: String, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Gone(_) => StatusCode::GONE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "Unauthorized",
            ApiError::Forbidden(_) => "Forbidden",
            ApiError::NotFound(_) => "NotFound",
            ApiError::Gone(_) => "Gone",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::Conflict(_) => "Conflict",
            ApiError::Upstream { .. } => "UpstreamError",
            ApiError::Internal(_) => "InternalServerError",
        }
    }

    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<crate::store::StoreError> for ApiError {
    fn from(e: crate::store::StoreError) -> Self {
        match e {
            crate::store::StoreError::NotFound(msg) => ApiError::NotFound(msg),
            crate::store::StoreError::Conflict(msg) => ApiError::Conflict(msg),
            crate::store::StoreError::PreconditionFailed(msg) => ApiError::BadRequest(msg),
        }
    }
}

/// Body shape from the spec's error handling design: `{statusCode,
/// timestamp, path, method, message, error}`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    #[serde(rename = "statusCode")]
    status_code: u16,
    timestamp: chrono::DateTime<Utc>,
    path: String,
    method: String,
    message: String,
    error: String,
}

/// Request context carried alongside an error so the boundary layer can
/// fill in `path`/`method` without the error type knowing about HTTP.
#[derive(Clone)]
pub struct ErrorContext {
    pub path: String,
    pub method: String,
}

tokio::task_local! {
    /// Set by `error::capture_context_layer` for the lifetime of each
    /// request's task, so handlers can return a bare `ApiError` via `?`
    /// and still get an error body with the real `path`/`method` (§7)
    /// instead of the test/background-task fallback.
    static REQUEST_CONTEXT: ErrorContext;
}

/// Outermost axum middleware: records path/method for the current
/// request's task so `ApiError::into_response` can fill them in even
/// when a handler only returns `Result<_, ApiError>` via `?`.
pub async fn capture_context_layer(request: axum::extract::Request, next: axum::middleware::Next) -> Response {
    let ctx = ErrorContext {
        path: request.uri().path().to_string(),
        method: request.method().to_string(),
    };
    REQUEST_CONTEXT.scope(ctx, next.run(request)).await
}

impl ApiError {
    pub fn into_response_with(self, ctx: ErrorContext) -> Response {
        let status = self.status();
        let body = ErrorBody {
            status_code: status.as_u16(),
            timestamp: Utc::now(),
            path: ctx.path,
            method: ctx.method,
            message: self.to_string(),
            error: self.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// IntoResponse for handlers that propagate `ApiError` with `?` instead
/// of building an `ErrorContext` themselves. Reads the path/method
/// `capture_context_layer` stashed for this request's task; falls back
/// to empty strings for errors surfaced from background tasks or tests,
/// where no such layer ran.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let ctx = REQUEST_CONTEXT
            .try_with(|c| c.clone())
            .unwrap_or_else(|_| ErrorContext {
                path: String::new(),
                method: String::new(),
            });
        self.into_response_with(ctx)
    }
}

/// Keys whose values are redacted before a request body ever reaches a
/// log line — case-insensitive substring match against the key name.
const SENSITIVE_KEY_FRAGMENTS: &[&str] = &["password", "token", "secret", "_key", "apikey"];

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEY_FRAGMENTS.iter().any(|frag| lower.contains(frag))
}

/// Walks a JSON value, replacing any object value whose key looks like
/// a credential with a fixed placeholder, so handler/error logging can
/// include request bodies without leaking bearer tokens or secrets.
pub fn redact_sensitive(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let redacted = map
                .iter()
                .map(|(k, v)| {
                    let v = if is_sensitive_key(k) {
                        serde_json::Value::String("[redacted]".to_string())
                    } else {
                        redact_sensitive(v)
                    };
                    (k.clone(), v)
                })
                .collect();
            serde_json::Value::Object(redacted)
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(redact_sensitive).collect()),
        other => other.clone(),
    }
}

/// Panic handler for `tower_http::catch_panic::CatchPanicLayer` (§7):
/// a panicking handler is normalized to an `internal` response instead
/// of severing the connection, mirroring the JoinSet panic containment
/// the dispatcher already applies to driver tasks.
pub fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic.message = %message, "request handler panicked");
    ApiError::Internal("internal server error".to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_sensitive_masks_known_fragments_recursively() {
        let body = serde_json::json!({
            "email": "a@b.com",
            "accessToken": "secret-value",
            "nested": { "apiKey": "abc", "name": "ok" }
        });
        let redacted = redact_sensitive(&body);
        assert_eq!(redacted["email"], "a@b.com");
        assert_eq!(redacted["accessToken"], "[redacted]");
        assert_eq!(redacted["nested"]["apiKey"], "[redacted]");
        assert_eq!(redacted["nested"]["name"], "ok");
    }
}
