//! Mediarelay API Library
//!
//! HTTP surface of the relay: handlers, error envelope, routing and
//! application setup.

mod api_doc;
mod handlers;

pub mod error;
pub mod setup;
pub mod state;

pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
