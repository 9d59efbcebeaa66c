//! Reddit threads via the public JSON listings of old.reddit.com
//!
//! Two phases:
//! 1. Search `"{keyword} Review"` (relevance, past month), following `after`
//!    cursors up to `limit_pages` pages, collecting thread permalinks.
//! 2. Fetch every thread body with its top comments concurrently, bounded by
//!    a semaphore and paced by a shared rate limiter. Threads that fail to
//!    load are skipped.

use futures::future::join_all;
use governor::{Quota, RateLimiter};
use serde_json::Value;
use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::serpapi::{array_field, str_field};
use super::{mismatch, SourceAdapter, SourceError, SourceRequest};
use crate::models::{RedditPost, ReviewRecord, SourceBatch, SourceKind};

pub const REDDIT_BASE_URL: &str = "https://old.reddit.com";
const USER_AGENT: &str = concat!("sts-api/", env!("CARGO_PKG_VERSION"), " (review research)");
const RESULTS_PER_PAGE: u32 = 25;
const COMMENTS_PER_THREAD: usize = 20;

/// Reddit adapter tuning
#[derive(Debug, Clone)]
pub struct RedditSettings {
    pub base_url: String,
    /// Concurrent thread fetches
    pub concurrent_limit: usize,
    pub requests_per_second: u32,
    /// Cap applied to the requested page count
    pub max_pages: u32,
    /// Pause after an HTTP 429 on a search page
    pub rate_limit_backoff: Duration,
}

impl Default for RedditSettings {
    fn default() -> Self {
        Self {
            base_url: REDDIT_BASE_URL.to_string(),
            concurrent_limit: 5,
            requests_per_second: 1,
            max_pages: 50,
            rate_limit_backoff: Duration::from_secs(30),
        }
    }
}

/// `"{keyword} Review"`
pub fn search_query(keyword: &str) -> String {
    format!("{} Review", keyword.trim())
}

pub struct RedditAdapter {
    http_client: reqwest::Client,
    settings: RedditSettings,
    rate_limiter: Arc<
        RateLimiter<
            governor::state::NotKeyed,
            governor::state::InMemoryState,
            governor::clock::DefaultClock,
        >,
    >,
}

impl RedditAdapter {
    pub fn new(settings: RedditSettings) -> Result<Self, SourceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SourceError::Http(e.to_string()))?;

        let per_second = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            http_client,
            settings,
            rate_limiter,
        })
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, SourceError> {
        self.rate_limiter.until_ready().await;

        let response = self.http_client.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16(), url.to_string()));
        }
        Ok(response.json().await?)
    }

    /// Phase 1: collect thread permalinks
    async fn search_threads(&self, query: &str, limit_pages: u32) -> Result<Vec<String>, SourceError> {
        let url = format!("{}/search.json", self.settings.base_url);
        let mut permalinks = Vec::new();
        let mut after: Option<String> = None;
        let mut backed_off = false;
        let mut page = 0u32;

        while page < limit_pages {
            page += 1;
            let mut params = vec![
                ("q", query.to_string()),
                ("sort", "relevance".to_string()),
                ("t", "month".to_string()),
                ("limit", RESULTS_PER_PAGE.to_string()),
                ("raw_json", "1".to_string()),
            ];
            if let Some(cursor) = &after {
                params.push(("after", cursor.clone()));
            }

            let listing = match self.get_json(&url, &params).await {
                Ok(listing) => listing,
                Err(SourceError::Status(429, _)) if !backed_off => {
                    warn!(
                        page,
                        backoff_secs = self.settings.rate_limit_backoff.as_secs(),
                        "Reddit rate limit hit, backing off"
                    );
                    tokio::time::sleep(self.settings.rate_limit_backoff).await;
                    backed_off = true;
                    page -= 1;
                    continue;
                }
                // Nothing collected yet: the source failed
                Err(e) if permalinks.is_empty() => return Err(e),
                Err(e) => {
                    warn!(page, error = %e, "Reddit search page failed, keeping earlier pages");
                    break;
                }
            };

            let (page_links, next) = parse_search_page(&listing);
            if page_links.is_empty() {
                debug!(page, "Reddit search page empty");
                break;
            }
            permalinks.extend(page_links);

            match next {
                Some(cursor) => after = Some(cursor),
                None => break,
            }
        }

        let mut seen = HashSet::new();
        permalinks.retain(|p| seen.insert(p.clone()));
        Ok(permalinks)
    }

    /// Phase 2: one thread with its top comments
    async fn fetch_thread(&self, permalink: &str) -> Result<RedditPost, SourceError> {
        let url = format!(
            "{}{}.json",
            self.settings.base_url,
            permalink.trim_end_matches('/')
        );
        let params = [
            ("limit", COMMENTS_PER_THREAD.to_string()),
            ("sort", "top".to_string()),
            ("raw_json", "1".to_string()),
        ];
        let thread = self.get_json(&url, &params).await?;
        parse_thread(&thread, &format!("{}{}", self.settings.base_url, permalink))
    }
}

#[async_trait::async_trait]
impl SourceAdapter for RedditAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Reddit
    }

    async fn fetch(&self, request: &SourceRequest) -> Result<SourceBatch, SourceError> {
        let SourceRequest::Reddit {
            keyword,
            limit_pages,
        } = request
        else {
            return Err(mismatch(self.kind(), request));
        };

        let query = search_query(keyword);
        let pages = (*limit_pages).clamp(1, self.settings.max_pages.max(1));
        info!(query = %query, pages, "Searching Reddit");

        let permalinks = self.search_threads(&query, pages).await?;
        info!(query = %query, threads = permalinks.len(), "Reddit threads found, fetching details");

        let semaphore = Arc::new(Semaphore::new(self.settings.concurrent_limit.max(1)));
        let fetches = permalinks.iter().map(|permalink| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                match self.fetch_thread(permalink).await {
                    Ok(post) => Some(post),
                    Err(e) => {
                        warn!(permalink = %permalink, error = %e, "Reddit thread skipped");
                        None
                    }
                }
            }
        });

        let records: Vec<ReviewRecord> = join_all(fetches)
            .await
            .into_iter()
            .flatten()
            .map(ReviewRecord::Reddit)
            .collect();

        info!(query = %query, count = records.len(), "Reddit threads fetched");
        Ok(SourceBatch::new(self.kind(), query, records))
    }
}

/// Permalinks on one search page plus the `after` cursor
///
/// Posts made to user profiles are skipped.
pub fn parse_search_page(listing: &Value) -> (Vec<String>, Option<String>) {
    let data = listing.get("data").unwrap_or(&Value::Null);
    let links = array_field(data, "children")
        .iter()
        .filter_map(|child| child.get("data"))
        .filter_map(|post| str_field(post, "permalink"))
        .filter(|permalink| !permalink.contains("/user/") && !permalink.contains("/r/u_"))
        .collect();
    let after = str_field(data, "after");
    (links, after)
}

/// Thread listing is `[post_listing, comment_listing]`
pub fn parse_thread(thread: &Value, url: &str) -> Result<RedditPost, SourceError> {
    let listings = thread
        .as_array()
        .ok_or_else(|| SourceError::Parse("thread response is not a listing pair".to_string()))?;

    let post = listings
        .first()
        .and_then(|l| l.get("data"))
        .map(|d| array_field(d, "children"))
        .and_then(|children| children.first())
        .and_then(|c| c.get("data"))
        .ok_or_else(|| SourceError::Parse("thread has no post".to_string()))?;

    let comments: Vec<String> = listings
        .get(1)
        .and_then(|l| l.get("data"))
        .map(|d| array_field(d, "children"))
        .unwrap_or(&[])
        .iter()
        .filter(|c| c.get("kind").and_then(Value::as_str) == Some("t1"))
        .filter_map(|c| c.get("data").and_then(|d| str_field(d, "body")))
        .filter(|body| !body.trim().is_empty() && body != "[deleted]" && body != "[removed]")
        .take(COMMENTS_PER_THREAD)
        .collect();

    let posted = post
        .get("created_utc")
        .and_then(Value::as_f64)
        .and_then(|ts| chrono::DateTime::from_timestamp(ts as i64, 0))
        .map(|dt| dt.to_rfc3339());

    Ok(RedditPost {
        title: str_field(post, "title").unwrap_or_default(),
        url: url.to_string(),
        posted,
        comment_count: post
            .get("num_comments")
            .and_then(Value::as_u64)
            .unwrap_or(comments.len() as u64),
        body_text: str_field(post, "selftext").unwrap_or_default(),
        comments,
    })
}
