//! Google Play reviews (SerpAPI `google_play_product` engine)

use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::serpapi::{array_field, f64_field, str_field, SerpApiClient};
use super::{mismatch, SourceAdapter, SourceError, SourceRequest};
use crate::models::{GooglePlayReview, ReviewRecord, SourceBatch, SourceKind};

/// Maximum reviews SerpAPI returns per request
const REVIEWS_PER_REQUEST: u32 = 199;

pub struct GooglePlayAdapter {
    serpapi: Arc<SerpApiClient>,
}

impl GooglePlayAdapter {
    pub fn new(serpapi: Arc<SerpApiClient>) -> Self {
        Self { serpapi }
    }
}

#[async_trait::async_trait]
impl SourceAdapter for GooglePlayAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::GooglePlay
    }

    async fn fetch(&self, request: &SourceRequest) -> Result<SourceBatch, SourceError> {
        let SourceRequest::GooglePlay {
            product_id,
            platform,
        } = request
        else {
            return Err(mismatch(self.kind(), request));
        };

        info!(product_id = %product_id, platform = %platform, "Fetching Google Play reviews");

        let params = [
            ("store", "apps".to_string()),
            ("product_id", product_id.clone()),
            ("all_reviews", "true".to_string()),
            ("platform", platform.clone()),
            // 2 = newest first
            ("sort_by", "2".to_string()),
            ("num", REVIEWS_PER_REQUEST.to_string()),
        ];
        let body = self.serpapi.search("google_play_product", &params).await?;
        let records = parse_reviews(&body);

        info!(product_id = %product_id, count = records.len(), "Google Play reviews fetched");
        Ok(SourceBatch::new(self.kind(), product_id.clone(), records))
    }
}

/// Extract review records; entries without a snippet are skipped
pub fn parse_reviews(body: &Value) -> Vec<ReviewRecord> {
    array_field(body, "reviews")
        .iter()
        .filter_map(|review| {
            let snippet = str_field(review, "snippet")?;
            if snippet.trim().is_empty() {
                return None;
            }
            Some(ReviewRecord::GooglePlay(GooglePlayReview {
                rating: f64_field(review, "rating"),
                snippet,
                likes: review.get("likes").and_then(Value::as_i64),
                iso_date: str_field(review, "iso_date"),
            }))
        })
        .collect()
}
