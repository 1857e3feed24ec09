//! Mediarelay Storage Library
//!
//! Owns the scratch directory transfers stream into before re-upload.
//!
//! # File naming
//!
//! Files are named `{unix_millis}-{uuid}.{ext}` so that concurrent transfers
//! never share a path without any locking. The directory carries no meaning
//! across restarts; anything found there older than the staleness threshold
//! is deleted by the sweep.

pub mod error;
pub mod sweep;
pub mod temp;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use sweep::SweepService;
pub use temp::{SweepReport, TempStore, TempStoreStats, TransientFile};
