//! Scrape endpoints
//!
//! `POST /scrape` starts a multi-source task; `POST /scrape/{source}` starts a
//! task for one source. All of them answer immediately with the task id and
//! the URLs to poll or subscribe to; the work runs in the background.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use sts_common::events::TaskStatus;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::services::ScrapeJob;
use crate::sources::SourceRequest;
use crate::AppState;

pub const MAX_TARGET_REVIEWS: u32 = 500;
pub const MAX_REDDIT_PAGES: u32 = 50;

fn default_platform() -> String {
    "phone".to_string()
}

fn default_country() -> String {
    "us".to_string()
}

fn default_target_reviews() -> u32 {
    199
}

fn default_limit_pages() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct GooglePlayParams {
    /// e.g. `com.spotify.music`
    pub product_id: String,
    /// phone, tablet or chromebook
    #[serde(default = "default_platform")]
    pub platform: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppleStoreParams {
    /// Numeric App Store id
    pub product_id: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_target_reviews")]
    pub target_reviews: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedditParams {
    /// Searched as `"{keyword} Review"`
    pub keyword: String,
    #[serde(default = "default_limit_pages")]
    pub limit_pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleSearchParams {
    pub product_name: String,
}

/// POST /scrape request
///
/// Reddit and Google Search default to `product_name` when enabled without
/// their own parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct MultiSourceScrapeRequest {
    pub product_name: String,
    pub google_play: Option<GooglePlayParams>,
    pub apple_store: Option<AppleStoreParams>,
    pub reddit: Option<RedditParams>,
    pub google_search: Option<GoogleSearchParams>,
    #[serde(default = "default_true")]
    pub include_reddit: bool,
    #[serde(default = "default_true")]
    pub include_google_search: bool,
}

/// Response of every scrape endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ScrapeStartResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub message: String,
    pub poll_url: String,
    pub websocket_url: String,
    pub events_url: String,
}

fn require_non_empty(field: &str, value: &str) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

impl GooglePlayParams {
    fn to_request(&self) -> ApiResult<SourceRequest> {
        Ok(SourceRequest::GooglePlay {
            product_id: require_non_empty("google_play.product_id", &self.product_id)?,
            platform: require_non_empty("google_play.platform", &self.platform)?,
        })
    }
}

impl AppleStoreParams {
    fn to_request(&self) -> ApiResult<SourceRequest> {
        if !(1..=MAX_TARGET_REVIEWS).contains(&self.target_reviews) {
            return Err(ApiError::BadRequest(format!(
                "apple_store.target_reviews must be between 1 and {}",
                MAX_TARGET_REVIEWS
            )));
        }
        Ok(SourceRequest::AppleStore {
            product_id: require_non_empty("apple_store.product_id", &self.product_id)?,
            country: require_non_empty("apple_store.country", &self.country)?,
            target_reviews: self.target_reviews,
        })
    }
}

impl RedditParams {
    fn to_request(&self) -> ApiResult<SourceRequest> {
        if !(1..=MAX_REDDIT_PAGES).contains(&self.limit_pages) {
            return Err(ApiError::BadRequest(format!(
                "reddit.limit_pages must be between 1 and {}",
                MAX_REDDIT_PAGES
            )));
        }
        Ok(SourceRequest::Reddit {
            keyword: require_non_empty("reddit.keyword", &self.keyword)?,
            limit_pages: self.limit_pages,
        })
    }
}

impl GoogleSearchParams {
    fn to_request(&self) -> ApiResult<SourceRequest> {
        Ok(SourceRequest::GoogleSearch {
            product_name: require_non_empty("google_search.product_name", &self.product_name)?,
        })
    }
}

impl MultiSourceScrapeRequest {
    /// Validate and convert into a job, sources in canonical order
    pub fn into_job(self) -> ApiResult<ScrapeJob> {
        let product_name = require_non_empty("product_name", &self.product_name)?;
        let mut requests = Vec::new();

        if let Some(params) = &self.google_play {
            requests.push(params.to_request()?);
        }
        if let Some(params) = &self.apple_store {
            requests.push(params.to_request()?);
        }
        if self.include_reddit {
            let params = self.reddit.clone().unwrap_or_else(|| RedditParams {
                keyword: product_name.clone(),
                limit_pages: default_limit_pages(),
            });
            requests.push(params.to_request()?);
        }
        if self.include_google_search {
            let params = self.google_search.clone().unwrap_or_else(|| GoogleSearchParams {
                product_name: product_name.clone(),
            });
            requests.push(params.to_request()?);
        }

        if requests.is_empty() {
            return Err(ApiError::BadRequest(
                "At least one source must be enabled".to_string(),
            ));
        }

        Ok(ScrapeJob {
            product_name,
            requests,
        })
    }
}

async fn start_job(state: &AppState, job: ScrapeJob) -> ApiResult<(StatusCode, Json<ScrapeStartResponse>)> {
    let sources: Vec<String> = job.sources().iter().map(|s| s.to_string()).collect();
    let product = job.product_name.clone();
    let task_id = state.coordinator.start(job).await?;

    info!(task_id = %task_id, product = %product, sources = %sources.join(","), "Scrape task accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(ScrapeStartResponse {
            poll_url: format!("/task/{}", task_id),
            websocket_url: format!("/task/{}/progress", task_id),
            events_url: format!("/task/{}/events", task_id),
            task_id,
            status: TaskStatus::Pending,
            message: format!("Scraping task started for {} sources", sources.len()),
        }),
    ))
}

/// POST /scrape
pub async fn scrape_all(
    State(state): State<AppState>,
    Json(request): Json<MultiSourceScrapeRequest>,
) -> ApiResult<(StatusCode, Json<ScrapeStartResponse>)> {
    let job = request.into_job()?;
    start_job(&state, job).await
}

/// POST /scrape/google-play
pub async fn scrape_google_play(
    State(state): State<AppState>,
    Json(params): Json<GooglePlayParams>,
) -> ApiResult<(StatusCode, Json<ScrapeStartResponse>)> {
    let request = params.to_request()?;
    let job = ScrapeJob {
        product_name: params.product_id.trim().to_string(),
        requests: vec![request],
    };
    start_job(&state, job).await
}

/// POST /scrape/apple-store
pub async fn scrape_apple_store(
    State(state): State<AppState>,
    Json(params): Json<AppleStoreParams>,
) -> ApiResult<(StatusCode, Json<ScrapeStartResponse>)> {
    let request = params.to_request()?;
    let job = ScrapeJob {
        product_name: params.product_id.trim().to_string(),
        requests: vec![request],
    };
    start_job(&state, job).await
}

/// POST /scrape/reddit
pub async fn scrape_reddit(
    State(state): State<AppState>,
    Json(params): Json<RedditParams>,
) -> ApiResult<(StatusCode, Json<ScrapeStartResponse>)> {
    let request = params.to_request()?;
    let job = ScrapeJob {
        product_name: params.keyword.trim().to_string(),
        requests: vec![request],
    };
    start_job(&state, job).await
}

/// POST /scrape/google-search
pub async fn scrape_google_search(
    State(state): State<AppState>,
    Json(params): Json<GoogleSearchParams>,
) -> ApiResult<(StatusCode, Json<ScrapeStartResponse>)> {
    let request = params.to_request()?;
    let job = ScrapeJob {
        product_name: params.product_name.trim().to_string(),
        requests: vec![request],
    };
    start_job(&state, job).await
}

/// Build scrape routes
pub fn scrape_routes() -> Router<AppState> {
    Router::new()
        .route("/scrape", post(scrape_all))
        .route("/scrape/google-play", post(scrape_google_play))
        .route("/scrape/apple-store", post(scrape_apple_store))
        .route("/scrape/reddit", post(scrape_reddit))
        .route("/scrape/google-search", post(scrape_google_search))
}
