//! Mediarelay Services Layer
//!
//! This crate is the **relay service layer**: fetching sources, extracting
//! media from pages, uploading to the destination host and the orchestration
//! tying them together. It re-exports what the API crate needs so handlers
//! depend on a single facade. Keep thin HTTP handling in mediarelay-api.

pub mod extractor;
pub mod fetcher;
pub mod media_type;
pub mod transfer;
pub mod uploader;

pub use extractor::{
    extract_media, syndication_token, ExtractionStrategy, StrategySet, SyndicationStrategy,
};
pub use fetcher::{ContentFetcher, FetchMode, FetchedResponse, FetcherConfig};
pub use mediarelay_infra::RetryPolicy;
pub use mediarelay_storage::{SweepService, TempStore, TempStoreStats, TransientFile};
pub use transfer::{TransferConfig, TransferService, DEFAULT_MAX_CANDIDATES};
pub use uploader::{interpret_response, plan_chunks, ChunkRange, UploadEngine, UploadEngineConfig};
