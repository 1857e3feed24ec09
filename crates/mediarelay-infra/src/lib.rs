//! Mediarelay Infrastructure
//!
//! Cross-cutting plumbing shared by the relay services and the HTTP API:
//! the retry executor, tracing initialization and request-id middleware.

pub mod middleware;
pub mod retry;
pub mod telemetry;

pub use middleware::{request_id_middleware, RequestId, REQUEST_ID_HEADER};
pub use retry::{retry, retry_recoverable, RetryPolicy};
pub use telemetry::init_telemetry;
