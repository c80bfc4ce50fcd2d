use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};

/// Set once at startup from `server.dev_mode`.
static EXPOSE_INTERNAL_ERRORS: AtomicBool = AtomicBool::new(false);

pub fn set_expose_internal_errors(expose: bool) {
    EXPOSE_INTERNAL_ERRORS.store(expose, Ordering::Relaxed);
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("pool error: {0}")]
    Pool(#[from] deadpool_sqlite::InteractError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Message sent to the client for a 500. Details only leave the process in dev mode.
fn internal_message(detail: &str, expose: bool) -> String {
    if expose {
        format!("internal server error: {detail}")
    } else {
        "internal server error".to_string()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let expose = EXPOSE_INTERNAL_ERRORS.load(Ordering::Relaxed);
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    internal_message(&e.to_string(), expose),
                )
            }
            AppError::Pool(e) => {
                tracing::error!(error = %e, "pool error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    internal_message(&e.to_string(), expose),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    internal_message(msg, expose),
                )
            }
        };

        let body = json!({ "success": false, "error": message });
        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// JSON extractor that logs deserialization errors before rejecting them as 400s.
/// Drop-in replacement for `axum::Json<T>`.
pub struct LoggedJson<T>(pub T);

impl<S, T> FromRequest<S> for LoggedJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(
        req: axum::extract::Request,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        let path = req.uri().path().to_string();
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(LoggedJson(value)),
            Err(rejection) => {
                tracing::warn!(
                    path = %path,
                    status = 400,
                    error = %rejection,
                    "JSON parse error (client sent malformed payload)"
                );
                Err(AppError::Validation(rejection.body_text()))
            }
        }
    }
}

/// Query-string extractor whose rejections use the JSON error envelope.
pub struct LoggedQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for LoggedQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match axum::extract::Query::<T>::from_request_parts(parts, state).await {
            Ok(axum::extract::Query(value)) => Ok(LoggedQuery(value)),
            Err(rejection) => {
                tracing::warn!(
                    path = %parts.uri.path(),
                    error = %rejection,
                    "query string rejected"
                );
                Err(AppError::Validation(rejection.body_text()))
            }
        }
    }
}
