//! Raw review records as returned by the source adapters

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the four review sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceKind {
    #[serde(rename = "google_play_store")]
    GooglePlay,
    #[serde(rename = "apple_app_store")]
    AppleStore,
    #[serde(rename = "reddit")]
    Reddit,
    #[serde(rename = "google_search")]
    GoogleSearch,
}

impl SourceKind {
    /// All sources in canonical launch order
    pub const ALL: [SourceKind; 4] = [
        SourceKind::GooglePlay,
        SourceKind::AppleStore,
        SourceKind::Reddit,
        SourceKind::GoogleSearch,
    ];

    /// Wire name, as used in results and finding `sources` lists
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::GooglePlay => "google_play_store",
            SourceKind::AppleStore => "apple_app_store",
            SourceKind::Reddit => "reddit",
            SourceKind::GoogleSearch => "google_search",
        }
    }

    /// Human-readable name for progress messages and prompt headers
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceKind::GooglePlay => "Google Play Store",
            SourceKind::AppleStore => "Apple App Store",
            SourceKind::Reddit => "Reddit",
            SourceKind::GoogleSearch => "Google Search",
        }
    }

    /// Whether records from this source carry a star rating
    pub fn is_app_store(&self) -> bool {
        matches!(self, SourceKind::GooglePlay | SourceKind::AppleStore)
    }

    /// Pipe-delimited column header used when rendering rows for the classifier
    pub fn row_header(&self) -> &'static str {
        match self {
            SourceKind::GooglePlay => "rating | snippet | likes | iso_date",
            SourceKind::AppleStore => "title | text | rating | review_date | reviewed_version",
            SourceKind::Reddit => "title | posted | comment_count | body_text | comments_text",
            SourceKind::GoogleSearch => "link | title | snippet | source",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google_play_store" | "google-play" => Ok(SourceKind::GooglePlay),
            "apple_app_store" | "apple-store" => Ok(SourceKind::AppleStore),
            "reddit" => Ok(SourceKind::Reddit),
            "google_search" | "google-search" => Ok(SourceKind::GoogleSearch),
            other => Err(format!("Unknown source: {}", other)),
        }
    }
}

/// Google Play review (SerpAPI `google_play_product`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GooglePlayReview {
    pub rating: Option<f64>,
    pub snippet: String,
    pub likes: Option<i64>,
    pub iso_date: Option<String>,
}

/// Apple App Store review (SerpAPI `apple_reviews`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppleReview {
    pub title: String,
    pub text: String,
    pub rating: Option<f64>,
    pub review_date: Option<String>,
    pub reviewed_version: Option<String>,
}

/// Reddit thread with its top comments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedditPost {
    pub title: String,
    pub url: String,
    pub posted: Option<String>,
    pub comment_count: u64,
    pub body_text: String,
    pub comments: Vec<String>,
}

/// Google organic search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub link: String,
    pub title: String,
    pub snippet: String,
    pub source: Option<String>,
}

/// A single raw record from one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ReviewRecord {
    #[serde(rename = "google_play_store")]
    GooglePlay(GooglePlayReview),
    #[serde(rename = "apple_app_store")]
    AppleStore(AppleReview),
    Reddit(RedditPost),
    GoogleSearch(SearchResult),
}

impl ReviewRecord {
    pub fn source(&self) -> SourceKind {
        match self {
            ReviewRecord::GooglePlay(_) => SourceKind::GooglePlay,
            ReviewRecord::AppleStore(_) => SourceKind::AppleStore,
            ReviewRecord::Reddit(_) => SourceKind::Reddit,
            ReviewRecord::GoogleSearch(_) => SourceKind::GoogleSearch,
        }
    }

    /// Free text content used for deduplication
    pub fn content(&self) -> String {
        match self {
            ReviewRecord::GooglePlay(r) => r.snippet.clone(),
            ReviewRecord::AppleStore(r) => format!("{} {}", r.title, r.text),
            ReviewRecord::Reddit(p) => format!("{} {} {}", p.title, p.body_text, p.url),
            ReviewRecord::GoogleSearch(r) => format!("{} {}", r.link, r.snippet),
        }
    }

    /// Star rating, app store records only
    pub fn rating(&self) -> Option<f64> {
        match self {
            ReviewRecord::GooglePlay(r) => r.rating,
            ReviewRecord::AppleStore(r) => r.rating,
            _ => None,
        }
    }

    /// Render as one pipe-delimited row matching `SourceKind::row_header`
    pub fn to_row(&self) -> String {
        match self {
            ReviewRecord::GooglePlay(r) => format!(
                "{} | {} | {} | {}",
                opt(&r.rating),
                sanitize_cell(&r.snippet),
                opt(&r.likes),
                opt(&r.iso_date)
            ),
            ReviewRecord::AppleStore(r) => format!(
                "{} | {} | {} | {} | {}",
                sanitize_cell(&r.title),
                sanitize_cell(&r.text),
                opt(&r.rating),
                opt(&r.review_date),
                opt(&r.reviewed_version)
            ),
            ReviewRecord::Reddit(p) => {
                let comments: Vec<String> = p.comments.iter().map(|c| sanitize_cell(c)).collect();
                format!(
                    "{} | {} | {} | {} | {}",
                    sanitize_cell(&p.title),
                    opt(&p.posted),
                    p.comment_count,
                    sanitize_cell(&p.body_text),
                    comments.join(" ; ")
                )
            }
            ReviewRecord::GoogleSearch(r) => format!(
                "{} | {} | {} | {}",
                r.link,
                sanitize_cell(&r.title),
                sanitize_cell(&r.snippet),
                opt(&r.source)
            ),
        }
    }
}

fn opt<T: fmt::Display>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

/// Make free text safe for a pipe-delimited cell
///
/// Pipes become `[PIPE]`; newlines and runs of whitespace collapse to one space.
pub fn sanitize_cell(text: &str) -> String {
    text.replace('|', "[PIPE]")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Everything one adapter returned for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceBatch {
    pub source: SourceKind,
    /// What was asked of the source (product id, keyword, search query)
    pub query: String,
    pub records: Vec<ReviewRecord>,
}

impl SourceBatch {
    pub fn new(source: SourceKind, query: impl Into<String>, records: Vec<ReviewRecord>) -> Self {
        Self {
            source,
            query: query.into(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
