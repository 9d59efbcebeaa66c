//! Review source adapters
//!
//! Each adapter fetches raw records from one external source and implements
//! [`SourceAdapter`]. Adapters are independent: the coordinator runs them
//! concurrently and a failing adapter never affects the others.
//!
//! # Adapters
//! 1. **google_play** - Google Play reviews via SerpAPI
//! 2. **apple_store** - App Store reviews via SerpAPI, paginated
//! 3. **reddit** - Reddit search + thread comments via the public JSON listing
//! 4. **google_search** - Google organic results via SerpAPI

pub mod apple_store;
pub mod google_play;
pub mod google_search;
pub mod reddit;
pub mod serpapi;

pub use apple_store::AppleStoreAdapter;
pub use google_play::GooglePlayAdapter;
pub use google_search::GoogleSearchAdapter;
pub use reddit::{RedditAdapter, RedditSettings};
pub use serpapi::SerpApiClient;

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{SourceBatch, SourceKind};

/// Failure of a single source fetch
///
/// Non-fatal to the task: the coordinator records it against the source and
/// carries on with the others.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Http(String),

    #[error("HTTP {0}: {1}")]
    Status(u16, String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::Parse(e.to_string())
        } else {
            SourceError::Http(e.to_string())
        }
    }
}

/// Source-specific parameters for one fetch
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRequest {
    GooglePlay {
        product_id: String,
        platform: String,
    },
    AppleStore {
        product_id: String,
        country: String,
        target_reviews: u32,
    },
    Reddit {
        keyword: String,
        limit_pages: u32,
    },
    GoogleSearch {
        product_name: String,
    },
}

impl SourceRequest {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceRequest::GooglePlay { .. } => SourceKind::GooglePlay,
            SourceRequest::AppleStore { .. } => SourceKind::AppleStore,
            SourceRequest::Reddit { .. } => SourceKind::Reddit,
            SourceRequest::GoogleSearch { .. } => SourceKind::GoogleSearch,
        }
    }

    /// The query as sent to the source
    pub fn query(&self) -> String {
        match self {
            SourceRequest::GooglePlay { product_id, .. } => product_id.clone(),
            SourceRequest::AppleStore { product_id, .. } => product_id.clone(),
            SourceRequest::Reddit { keyword, .. } => reddit::search_query(keyword),
            SourceRequest::GoogleSearch { product_name } => google_search::search_query(product_name),
        }
    }
}

/// One review source
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Fetch raw records
    ///
    /// # Errors
    /// `SourceError` on any transport, provider or parse failure. The request
    /// variant must match `kind()`; a mismatch is `InvalidRequest`.
    async fn fetch(&self, request: &SourceRequest) -> Result<SourceBatch, SourceError>;
}

/// Adapters available to the coordinator, keyed by source
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: BTreeMap<SourceKind, Arc<dyn SourceAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one for the same source
    pub fn register(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.insert(adapter.kind(), adapter);
        self
    }

    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    pub fn count(&self) -> usize {
        self.adapters.len()
    }
}

pub(crate) fn mismatch(expected: SourceKind, request: &SourceRequest) -> SourceError {
    SourceError::InvalidRequest(format!(
        "{} adapter cannot serve a {} request",
        expected,
        request.kind()
    ))
}

// ============================================================================
// Mock Adapter for Testing
// ============================================================================
