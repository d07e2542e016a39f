//! HTTP error response conversion
//!
//! Handlers return `Result<impl IntoResponse, HttpAppError>`. Anything that
//! converts into [`AppError`] converts into `HttpAppError` with `?`, so every
//! failure renders with the same status mapping, body shape and logging.

use axum::{
    extract::rejection::JsonRejection,
    extract::{FromRequest, Request},
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use pictor_core::{AppError, ErrorMetadata, LogLevel};
use pictor_storage::StorageError;
use serde::de::DeserializeOwned;

pub use pictor_infra::ErrorResponse;

/// Wrapper so `IntoResponse` can be implemented for the foreign `AppError`.
#[derive(Debug)]
pub struct HttpAppError(pub AppError);

impl From<AppError> for HttpAppError {
    fn from(err: AppError) -> Self {
        HttpAppError(err)
    }
}

impl From<anyhow::Error> for HttpAppError {
    fn from(err: anyhow::Error) -> Self {
        HttpAppError(AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        })
    }
}

/// JSON body deserialization failures become a 400 in our error format.
impl From<JsonRejection> for HttpAppError {
    fn from(rejection: JsonRejection) -> Self {
        HttpAppError(AppError::InvalidInput(format!(
            "Invalid request body: {}",
            rejection.body_text()
        )))
    }
}

/// `Json<T>` that rejects with [`ErrorResponse`] instead of axum's plain text.
///
/// Only the body's shape is checked here. Field rules are enforced by the
/// service that consumes the payload (`TransformationSpec::ensure_valid` for
/// transform requests).
#[derive(Debug, Clone, Copy)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = HttpAppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(inner) = Json::<T>::from_request(req, state)
            .await
            .map_err(HttpAppError::from)?;
        Ok(ValidatedJson(inner))
    }
}

/// Map a storage failure onto the shared taxonomy.
pub fn from_storage_error(err: StorageError) -> AppError {
    match err {
        StorageError::NotFound(msg) => AppError::NotFound(msg),
        StorageError::UploadFailed(msg)
        | StorageError::DownloadFailed(msg)
        | StorageError::DeleteFailed(msg)
        | StorageError::BackendError(msg) => AppError::Storage(msg),
        StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
        StorageError::IoError(err) => AppError::Internal(format!("IO error: {}", err)),
        StorageError::ConfigError(msg) => AppError::Internal(msg),
    }
}

impl From<StorageError> for HttpAppError {
    fn from(err: StorageError) -> Self {
        HttpAppError(from_storage_error(err))
    }
}

fn log_error(error: &AppError) {
    let error_type = error.error_type();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, error_type = error_type, "Error occurred");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, error_type = error_type, "Error occurred");
        }
        LogLevel::Error => {
            tracing::error!(error = %error, error_type = error_type, "Error occurred");
        }
    }
}

fn is_production_env() -> bool {
    std::env::var("ENVIRONMENT")
        .or_else(|_| std::env::var("APP_ENV"))
        .map(|env| env.to_lowercase() == "production" || env.to_lowercase() == "prod")
        .unwrap_or(false)
}

fn error_body(app_error: &AppError, show_details: bool) -> ErrorResponse {
    ErrorResponse {
        error: app_error.client_message(),
        details: show_details.then(|| app_error.detailed_message()),
        error_type: show_details.then(|| app_error.error_type().to_string()),
        code: app_error.error_code().to_string(),
        recoverable: app_error.is_recoverable(),
        suggested_action: app_error.suggested_action().map(String::from),
    }
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let app_error = &self.0;

        let status = StatusCode::from_u16(app_error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        log_error(app_error);

        // Details never leave the process in production or for sensitive errors.
        let show_details = !is_production_env() && !app_error.is_sensitive();
        let mut response = (status, Json(error_body(app_error, show_details))).into_response();

        if let Some(secs) = app_error.retry_after_secs() {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_storage_error_not_found() {
        let HttpAppError(app_err) = StorageError::NotFound("media/x".to_string()).into();
        match app_err {
            AppError::NotFound(msg) => assert_eq!(msg, "media/x"),
            other => panic!("Expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_from_storage_error_backend() {
        let HttpAppError(app_err) = StorageError::BackendError("timeout".to_string()).into();
        assert!(matches!(app_err, AppError::Storage(msg) if msg == "timeout"));
    }

    #[test]
    fn test_from_storage_error_invalid_key() {
        let HttpAppError(app_err) = StorageError::InvalidKey("../x".to_string()).into();
        assert!(matches!(app_err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_rate_limit_response_carries_retry_after() {
        let response =
            HttpAppError(AppError::RateLimitExceeded { retry_after_secs: 42 }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(RETRY_AFTER).and_then(|v| v.to_str().ok()),
            Some("42")
        );
    }

    #[test]
    fn test_dispatch_unavailable_is_503_without_retry_after() {
        let response =
            HttpAppError(AppError::DispatchUnavailable("queue down".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().get(RETRY_AFTER).is_none());
    }

    #[test]
    fn test_sensitive_errors_hide_details() {
        let body = error_body(&AppError::StoreUnavailable("pg down".to_string()), false);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["code"], "STORE_UNAVAILABLE");
        assert_eq!(json["recoverable"], true);
        assert!(json.get("details").is_none());
        assert!(json.get("error_type").is_none());
    }
}
