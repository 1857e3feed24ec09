//! Transfer orchestration
//!
//! Drives one source URL through `Validate -> Fetch -> [Extract ->
//! FetchExtracted] -> Persist -> Upload`, releasing the transient file on
//! every path once it has been allocated. Batches run each item through the
//! same flow independently.

use std::fmt;

use futures::stream::{self, StreamExt};
use mediarelay_core::{
    validate_source_url, AppError, BatchResult, MediaCandidate, SourcePolicy, TransferRequest,
    UploadResult,
};
use mediarelay_storage::{TempStore, TransientFile};
use url::Url;

use crate::extractor::{extract_media, StrategySet};
use crate::fetcher::{ContentFetcher, FetchMode, FetchedResponse};
use crate::media_type::resolve_extension;
use crate::uploader::UploadEngine;

pub const DEFAULT_MAX_CANDIDATES: usize = 3;

#[derive(Clone, Debug)]
pub struct TransferConfig {
    /// In-flight items per batch
    pub batch_concurrency: usize,
    /// Extracted candidates tried before giving up on a page
    pub max_candidates: usize,
    /// Offer plain links to the destination's URL upload before fetching locally
    pub remote_upload: bool,
    pub source_policy: SourcePolicy,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            batch_concurrency: 4,
            max_candidates: DEFAULT_MAX_CANDIDATES,
            remote_upload: false,
            source_policy: SourcePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Validate,
    Fetch,
    Extract,
    FetchExtracted,
    Persist,
    Upload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validate => "validate",
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::FetchExtracted => "fetch_extracted",
            Stage::Persist => "persist",
            Stage::Upload => "upload",
        };
        f.write_str(name)
    }
}

pub struct TransferService {
    fetcher: ContentFetcher,
    extractors: StrategySet,
    uploader: UploadEngine,
    temp_store: TempStore,
    config: TransferConfig,
}

impl TransferService {
    pub fn new(
        fetcher: ContentFetcher,
        extractors: StrategySet,
        uploader: UploadEngine,
        temp_store: TempStore,
        config: TransferConfig,
    ) -> Self {
        Self {
            fetcher,
            extractors,
            uploader,
            temp_store,
            config,
        }
    }

    pub fn temp_store(&self) -> &TempStore {
        &self.temp_store
    }

    /// Relay a single source to the destination host.
    #[tracing::instrument(skip(self, request), fields(source = %request.source_url, hint = ?request.type_hint))]
    pub async fn transfer(&self, request: &TransferRequest) -> Result<UploadResult, AppError> {
        let mut stage = Stage::Validate;
        match self.run(request, &mut stage).await {
            Ok(result) => {
                tracing::info!(public_url = %result.public_url, "Transfer completed");
                Ok(result)
            }
            Err(e) => {
                tracing::warn!(stage = %stage, error = %e, "Transfer failed");
                Err(e)
            }
        }
    }

    /// Relay every request, keeping request order in the outcomes. One item
    /// failing never stops the others.
    #[tracing::instrument(skip(self, requests), fields(items = requests.len()))]
    pub async fn transfer_batch(&self, requests: Vec<TransferRequest>) -> BatchResult {
        let outcomes: Vec<_> = stream::iter(requests)
            .map(|request| async move { self.transfer(&request).await })
            .buffered(self.config.batch_concurrency.max(1))
            .collect()
            .await;

        let batch = BatchResult { outcomes };
        tracing::info!(
            succeeded = batch.succeeded(),
            failed = batch.failed(),
            "Batch transfer finished"
        );
        batch
    }

    async fn run(&self, request: &TransferRequest, stage: &mut Stage) -> Result<UploadResult, AppError> {
        *stage = Stage::Validate;
        let source = validate_source_url(&request.source_url, &self.config.source_policy)?;

        if self.config.remote_upload && request.type_hint.is_none() {
            if let Some(result) = self.try_remote_upload(&source).await {
                return Ok(result);
            }
        }

        let response = match self.resolve_with_strategy(&source).await {
            Some(candidates) => {
                *stage = Stage::FetchExtracted;
                self.fetch_first_candidate(candidates).await?
            }
            None => {
                *stage = Stage::Fetch;
                let response = self.fetcher.fetch(&source, FetchMode::Page).await?;
                if response.is_html() {
                    *stage = Stage::Extract;
                    let page_url = response.final_url.clone();
                    let html = response.into_text().await?;
                    let candidates = extract_media(&html, &page_url)?;

                    *stage = Stage::FetchExtracted;
                    self.fetch_first_candidate(candidates).await?
                } else {
                    response
                }
            }
        };

        let extension = resolve_extension(
            request.type_hint,
            response.content_type.as_deref(),
            &response.final_url,
        );

        *stage = Stage::Persist;
        let mut file = self.temp_store.allocate(&extension);
        let outcome = self.persist_and_upload(response, &mut file, stage).await;
        file.release().await;
        outcome
    }

    async fn persist_and_upload(
        &self,
        response: FetchedResponse,
        file: &mut TransientFile,
        stage: &mut Stage,
    ) -> Result<UploadResult, AppError> {
        response.persist(file).await?;

        *stage = Stage::Upload;
        let extension = file.extension().to_string();
        self.uploader.upload(file.path(), &extension).await
    }

    /// Let the destination fetch `source` itself. `None` means the local
    /// pipeline should handle it.
    async fn try_remote_upload(&self, source: &Url) -> Option<UploadResult> {
        if self.extractors.matching(source).next().is_some() {
            return None;
        }
        match self.uploader.upload_remote(source).await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::info!(error = %e, "Remote upload refused, fetching locally");
                None
            }
        }
    }

    async fn resolve_with_strategy(&self, source: &Url) -> Option<Vec<MediaCandidate>> {
        for strategy in self.extractors.matching(source) {
            match strategy.resolve(source, &self.fetcher).await {
                Ok(candidates) if !candidates.is_empty() => {
                    tracing::debug!(
                        strategy = strategy.name(),
                        candidates = candidates.len(),
                        "Resolved media through extraction strategy"
                    );
                    return Some(candidates);
                }
                Ok(_) => {
                    tracing::debug!(strategy = strategy.name(), "Strategy found no media");
                }
                Err(e) => {
                    tracing::warn!(strategy = strategy.name(), error = %e, "Extraction strategy failed");
                }
            }
        }
        None
    }

    /// Fetch the best candidate that yields a binary payload.
    async fn fetch_first_candidate(
        &self,
        candidates: Vec<MediaCandidate>,
    ) -> Result<FetchedResponse, AppError> {
        let mut last_error = None;

        for candidate in candidates.into_iter().take(self.config.max_candidates.max(1)) {
            if let Err(e) = self.config.source_policy.check(&candidate.url) {
                tracing::debug!(candidate = %candidate.url, error = %e, "Skipping disallowed candidate");
                last_error = Some(e);
                continue;
            }

            match self.fetcher.fetch(&candidate.url, FetchMode::Binary).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::debug!(candidate = %candidate.url, error = %e, "Candidate fetch failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| AppError::NoMediaFound("No usable media candidate".to_string())))
    }
}
