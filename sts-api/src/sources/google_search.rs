//! Google organic search results (SerpAPI `google` engine)

use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::serpapi::{array_field, str_field, SerpApiClient};
use super::{mismatch, SourceAdapter, SourceError, SourceRequest};
use crate::models::{ReviewRecord, SearchResult, SourceBatch, SourceKind};

pub struct GoogleSearchAdapter {
    serpapi: Arc<SerpApiClient>,
}

impl GoogleSearchAdapter {
    pub fn new(serpapi: Arc<SerpApiClient>) -> Self {
        Self { serpapi }
    }
}

/// `"{product} Review"`
pub fn search_query(product_name: &str) -> String {
    format!("{} Review", product_name.trim())
}

#[async_trait::async_trait]
impl SourceAdapter for GoogleSearchAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::GoogleSearch
    }

    async fn fetch(&self, request: &SourceRequest) -> Result<SourceBatch, SourceError> {
        let SourceRequest::GoogleSearch { product_name } = request else {
            return Err(mismatch(self.kind(), request));
        };

        let query = search_query(product_name);
        info!(query = %query, "Fetching Google search results");

        let body = self.serpapi.search("google", &[("q", query.clone())]).await?;
        let records = parse_results(&body);

        info!(query = %query, count = records.len(), "Google search results fetched");
        Ok(SourceBatch::new(self.kind(), query, records))
    }
}

/// Organic results with a link; everything else is dropped
pub fn parse_results(body: &Value) -> Vec<ReviewRecord> {
    array_field(body, "organic_results")
        .iter()
        .filter_map(|result| {
            let link = str_field(result, "link").filter(|l| !l.is_empty())?;
            Some(ReviewRecord::GoogleSearch(SearchResult {
                link,
                title: str_field(result, "title").unwrap_or_default(),
                snippet: str_field(result, "snippet").unwrap_or_default(),
                source: str_field(result, "source"),
            }))
        })
        .collect()
}
