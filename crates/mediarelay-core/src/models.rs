//! Shared models passed between the relay pipeline stages.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

/// Caller-supplied hint about the kind of media behind a source URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TypeHint {
    Photo,
    AnimatedImage,
    Video,
    Audio,
}

impl TypeHint {
    /// Parse a hint as sent by clients. Unknown values yield `None` so that an
    /// unrecognised hint never blocks a transfer.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "photo" | "image" => Some(TypeHint::Photo),
            "animated_image" | "gif" => Some(TypeHint::AnimatedImage),
            "video" => Some(TypeHint::Video),
            "audio" => Some(TypeHint::Audio),
            _ => None,
        }
    }

    /// File extension used when the hint decides the stored file name.
    pub fn extension(&self) -> &'static str {
        match self {
            TypeHint::Photo => "jpg",
            TypeHint::AnimatedImage => "gif",
            TypeHint::Video => "mp4",
            TypeHint::Audio => "mp3",
        }
    }
}

/// One unit of work: relay `source_url` to the destination host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub source_url: String,
    pub type_hint: Option<TypeHint>,
}

impl TransferRequest {
    pub fn new(source_url: impl Into<String>, type_hint: Option<TypeHint>) -> Self {
        Self {
            source_url: source_url.into(),
            type_hint,
        }
    }
}

/// Kind of media a candidate URL was discovered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Image,
    Audio,
    Unknown,
}

/// A media URL found in a page, absolute and ready to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCandidate {
    pub url: url::Url,
    pub kind_hint: MediaKind,
}

/// Public URL returned by the destination host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct UploadResult {
    pub public_url: String,
}

/// Per-item outcome of a batch, in request order.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub outcomes: Vec<Result<UploadResult, AppError>>,
}

impl BatchResult {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Public URLs of the successful items, keeping request order.
    pub fn public_urls(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| o.as_ref().ok().map(|r| r.public_url.clone()))
            .collect()
    }

    /// Collapse into the batch verdict: success when at least one item went through.
    pub fn into_urls(self) -> Result<Vec<String>, AppError> {
        let urls = self.public_urls();
        if !urls.is_empty() {
            return Ok(urls);
        }

        let first_error = self
            .outcomes
            .into_iter()
            .find_map(|o| o.err())
            .map(|e| format!(": {}", e))
            .unwrap_or_default();

        Err(AppError::BatchFailed(format!(
            "No attachment could be relayed{}",
            first_error
        )))
    }
}
