//! Apple App Store reviews (SerpAPI `apple_reviews` engine)
//!
//! Pages are requested one at a time until the target count is reached, a
//! page comes back empty, or SerpAPI stops offering a `next` page.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::serpapi::{array_field, f64_field, str_field, SerpApiClient};
use super::{mismatch, SourceAdapter, SourceError, SourceRequest};
use crate::models::{AppleReview, ReviewRecord, SourceBatch, SourceKind};

pub struct AppleStoreAdapter {
    serpapi: Arc<SerpApiClient>,
    /// Upper bound on `target_reviews`
    max_reviews: u32,
}

impl AppleStoreAdapter {
    pub fn new(serpapi: Arc<SerpApiClient>, max_reviews: u32) -> Self {
        Self {
            serpapi,
            max_reviews,
        }
    }
}

#[async_trait::async_trait]
impl SourceAdapter for AppleStoreAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::AppleStore
    }

    async fn fetch(&self, request: &SourceRequest) -> Result<SourceBatch, SourceError> {
        let SourceRequest::AppleStore {
            product_id,
            country,
            target_reviews,
        } = request
        else {
            return Err(mismatch(self.kind(), request));
        };

        let target = (*target_reviews).min(self.max_reviews).max(1) as usize;
        info!(product_id = %product_id, country = %country, target, "Fetching App Store reviews");

        let mut records = Vec::new();
        let mut page = 1u32;

        while records.len() < target {
            let params = [
                ("product_id", product_id.clone()),
                ("country", country.clone()),
                ("page", page.to_string()),
            ];
            let body = self.serpapi.search("apple_reviews", &params).await?;
            let page_records = parse_reviews(&body);

            if page_records.is_empty() {
                debug!(page, "App Store page empty, stopping");
                break;
            }
            records.extend(page_records);
            debug!(page, total = records.len(), "App Store page fetched");

            if !has_next_page(&body) {
                break;
            }
            page += 1;
        }

        records.truncate(target);
        info!(product_id = %product_id, count = records.len(), pages = page, "App Store reviews fetched");
        Ok(SourceBatch::new(self.kind(), product_id.clone(), records))
    }
}

pub fn parse_reviews(body: &Value) -> Vec<ReviewRecord> {
    array_field(body, "reviews")
        .iter()
        .filter_map(|review| {
            let title = str_field(review, "title").unwrap_or_default();
            let text = str_field(review, "text").unwrap_or_default();
            if title.trim().is_empty() && text.trim().is_empty() {
                return None;
            }
            Some(ReviewRecord::AppleStore(AppleReview {
                title,
                text,
                rating: f64_field(review, "rating"),
                review_date: str_field(review, "review_date"),
                reviewed_version: str_field(review, "reviewed_version"),
            }))
        })
        .collect()
}

pub fn has_next_page(body: &Value) -> bool {
    body.get("serpapi_pagination")
        .and_then(|p| p.get("next"))
        .is_some()
}
