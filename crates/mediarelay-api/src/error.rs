//! HTTP error response conversion
//!
//! Handlers return `Result<impl IntoResponse, HttpAppError>` and use `?` on
//! anything convertible into `AppError`; the failure then renders as the
//! `{success: false, error, ...}` envelope with the status its kind maps to.

use axum::{
    extract::rejection::JsonRejection,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mediarelay_core::{AppError, ErrorMetadata, LogLevel};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Always `false`
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Machine-readable error code for programmatic handling
    pub code: String,
    /// Whether retrying the same request may succeed
    pub recoverable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

/// Wrapper for AppError so it can implement IntoResponse (orphan rule)
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

impl From<JsonRejection> for HttpAppError {
    fn from(rejection: JsonRejection) -> Self {
        HttpAppError(AppError::Validation(format!(
            "Invalid request body: {}",
            rejection.body_text()
        )))
    }
}

/// JSON body extractor that answers malformed bodies with our 400 envelope
/// instead of axum's plain-text rejection.
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

fn log_error(error: &AppError) {
    let error_type = error.error_type();
    match error.log_level() {
        LogLevel::Debug => {
            tracing::debug!(error = %error, error_type = error_type, "Request failed");
        }
        LogLevel::Warn => {
            tracing::warn!(error = %error, error_type = error_type, "Request failed");
        }
        LogLevel::Error => {
            tracing::error!(error = %error, error_type = error_type, "Request failed");
        }
    }
}

static HIDE_ERROR_DETAILS: AtomicBool = AtomicBool::new(false);

/// Set once at start-up from `Config::is_production()`.
pub fn hide_error_details(hide: bool) {
    HIDE_ERROR_DETAILS.store(hide, Ordering::Relaxed);
}

fn include_details(error: &AppError, hide_details: bool) -> bool {
    !hide_details && !error.is_sensitive()
}

impl ErrorResponse {
    pub fn from_app_error(error: &AppError, include_details: bool) -> Self {
        let (details, error_type) = if include_details {
            (
                Some(error.detailed_message()),
                Some(error.error_type().to_string()),
            )
        } else {
            (None, None)
        };

        Self {
            success: false,
            error: error.client_message(),
            details,
            error_type,
            code: error.error_code().to_string(),
            recoverable: error.is_recoverable(),
            suggested_action: error.suggested_action().map(String::from),
        }
    }
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let app_error = &self.0;

        let status = StatusCode::from_u16(app_error.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        log_error(app_error);

        let body = ErrorResponse::from_app_error(
            app_error,
            include_details(app_error, HIDE_ERROR_DETAILS.load(Ordering::Relaxed)),
        );

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = HttpAppError::from(err).into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_error_envelope() {
        let (status, body) = render(AppError::Validation("URL is required".to_string())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "URL is required");
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["recoverable"], false);
    }

    #[tokio::test]
    async fn test_upstream_status_is_mirrored() {
        let (status, body) = render(AppError::UpstreamStatus {
            status: 404,
            message: "Not Found".to_string(),
        })
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Source responded with status 404");
    }

    #[test]
    fn test_production_hides_details() {
        let err = AppError::Validation("URL is required".to_string());

        assert!(include_details(&err, false));
        assert!(!include_details(&err, true));

        let body = ErrorResponse::from_app_error(&err, include_details(&err, true));
        assert!(body.details.is_none());
        assert!(body.error_type.is_none());
        assert_eq!(body.code, "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let (status, body) =
            render(AppError::Internal("pool exhausted at 0xdeadbeef".to_string())).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
        assert!(body.get("details").is_none());
    }
}
