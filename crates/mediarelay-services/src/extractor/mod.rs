//! Media extraction
//!
//! Generic pages go through [`extract_media`]. Sites whose pages do not embed
//! their media in markup get an [`ExtractionStrategy`] of their own, chosen by
//! URL before the generic path is tried.

mod html;
mod syndication;

pub use html::extract_media;
pub use syndication::{syndication_token, SyndicationStrategy, DEFAULT_SYNDICATION_ENDPOINT};

use std::sync::Arc;

use async_trait::async_trait;
use mediarelay_core::{AppError, MediaCandidate};
use url::Url;

use crate::fetcher::ContentFetcher;

/// A site-specific way of turning a page URL into media URLs
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy knows how to handle `url`
    fn matches(&self, url: &Url) -> bool;

    /// Candidate media URLs for `url`, best first. An empty list means the
    /// strategy found nothing and the generic path should be used.
    async fn resolve(
        &self,
        url: &Url,
        fetcher: &ContentFetcher,
    ) -> Result<Vec<MediaCandidate>, AppError>;
}

/// Ordered set of specialized strategies
#[derive(Clone, Default)]
pub struct StrategySet {
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
}

impl StrategySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The strategies shipped with the relay.
    pub fn with_defaults() -> Result<Self, AppError> {
        Ok(Self::new().with(SyndicationStrategy::new(DEFAULT_SYNDICATION_ENDPOINT)?))
    }

    pub fn with(mut self, strategy: impl ExtractionStrategy + 'static) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    /// Strategies applicable to `url`, in registration order
    pub fn matching<'a>(&'a self, url: &'a Url) -> impl Iterator<Item = &'a dyn ExtractionStrategy> + 'a {
        self.strategies
            .iter()
            .map(|s| s.as_ref())
            .filter(move |s| s.matches(url))
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
