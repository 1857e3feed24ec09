//! Error types module
//!
//! Every failure of the relay pipeline is expressed as an `AppError`. Components
//! return these unchanged so the HTTP layer can map each kind to a status code
//! and a stable error body, and so retry call sites can ask whether a failure
//! is worth another attempt.

use std::io;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for failures caused by a remote party
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "TRANSPORT_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether this error is transient and the operation can be retried
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden from clients
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unexpected content type: expected {expected}, got {actual}")]
    UnexpectedContentType { expected: String, actual: String },

    #[error("No media found: {0}")]
    NoMediaFound(String),

    #[error("Source responded with status {status}: {message}")]
    UpstreamStatus { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Upload rejected by destination: {0}")]
    UploadRejected(String),

    #[error("Upload transport error: {0}")]
    UploadTransport(String),

    #[error("File too large: {size} bytes exceeds limit of {max} bytes")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Batch failed: {0}")]
    BatchFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON parsing error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
/// `UpstreamStatus` derives its status and recoverability from the mirrored code,
/// see the `ErrorMetadata` impl.
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Validation(_) => (
            400,
            "VALIDATION_ERROR",
            false,
            Some("Provide an absolute http(s) URL"),
            false,
            LogLevel::Debug,
        ),
        AppError::UnexpectedContentType { .. } => (
            415,
            "UNEXPECTED_CONTENT_TYPE",
            false,
            Some("Link directly to the media file or to a page embedding it"),
            false,
            LogLevel::Debug,
        ),
        AppError::NoMediaFound(_) => (
            422,
            "NO_MEDIA_FOUND",
            false,
            Some("Check that the page embeds a video, image or audio file"),
            false,
            LogLevel::Debug,
        ),
        AppError::UpstreamStatus { .. } => (
            502,
            "UPSTREAM_STATUS",
            false,
            Some("Verify the source URL is publicly reachable"),
            false,
            LogLevel::Warn,
        ),
        AppError::Transport(_) => (
            502,
            "TRANSPORT_ERROR",
            true,
            Some("Retry after a short delay"),
            false,
            LogLevel::Warn,
        ),
        AppError::UploadRejected(_) => (
            502,
            "UPLOAD_REJECTED",
            false,
            Some("The destination refused the file; check its type and size limits"),
            false,
            LogLevel::Warn,
        ),
        AppError::UploadTransport(_) => (
            503,
            "UPLOAD_TRANSPORT_ERROR",
            true,
            Some("Retry after a short delay"),
            false,
            LogLevel::Warn,
        ),
        AppError::FileTooLarge { .. } => (
            413,
            "FILE_TOO_LARGE",
            false,
            Some("Use a smaller source file"),
            false,
            LogLevel::Debug,
        ),
        AppError::BatchFailed(_) => (
            400,
            "BATCH_FAILED",
            false,
            Some("Check every attachment URL and retry"),
            false,
            LogLevel::Debug,
        ),
        AppError::Io(_) => (
            500,
            "IO_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Validation(_) => "Validation",
            AppError::UnexpectedContentType { .. } => "UnexpectedContentType",
            AppError::NoMediaFound(_) => "NoMediaFound",
            AppError::UpstreamStatus { .. } => "UpstreamStatus",
            AppError::Transport(_) => "Transport",
            AppError::UploadRejected(_) => "UploadRejected",
            AppError::UploadTransport(_) => "UploadTransport",
            AppError::FileTooLarge { .. } => "FileTooLarge",
            AppError::BatchFailed(_) => "BatchFailed",
            AppError::Io(_) => "Io",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        match self {
            AppError::UpstreamStatus { status, .. } if (400..600).contains(status) => *status,
            _ => app_error_static_metadata(self).0,
        }
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        match self {
            AppError::UpstreamStatus { status, .. } => *status >= 500 || *status == 429,
            _ => app_error_static_metadata(self).2,
        }
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Validation(ref msg) => msg.clone(),
            AppError::UnexpectedContentType { expected, actual } => {
                format!("Expected {} content but the source returned {}", expected, actual)
            }
            AppError::NoMediaFound(ref msg) => msg.clone(),
            AppError::UpstreamStatus { status, .. } => {
                format!("Source responded with status {}", status)
            }
            AppError::Transport(ref msg) => format!("Failed to reach source: {}", msg),
            AppError::UploadRejected(ref msg) => msg.clone(),
            AppError::UploadTransport(_) => "Failed to reach the destination host".to_string(),
            AppError::FileTooLarge { size, max } => {
                format!("File too large: {} bytes exceeds limit of {} bytes", size, max)
            }
            AppError::BatchFailed(ref msg) => msg.clone(),
            AppError::Io(_) => "Failed to access temporary storage".to_string(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
        }
    }
}
