//! Mediarelay Core Library
//!
//! Error types, configuration, shared models and source URL validation used by
//! every other mediarelay crate.

pub mod config;
pub mod error;
pub mod models;
pub mod validation;

// Re-export commonly used types
pub use config::{BaseConfig, Config, RelayConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{BatchResult, MediaCandidate, MediaKind, TransferRequest, TypeHint, UploadResult};
pub use validation::{validate_source_url, SourcePolicy};
