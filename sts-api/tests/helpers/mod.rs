//! Test Helper Utilities
//!
//! Stub adapters and classifier plus app construction for sts-api
//! integration tests.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tower::util::ServiceExt;

use sts_api::config::ServiceConfig;
use sts_api::models::{
    AppleReview, Finding, FindingType, GooglePlayReview, RedditPost, ReviewRecord, SearchResult,
    Severity, SourceBatch, SourceKind, Task,
};
use sts_api::services::analysis::AnalysisSettings;
use sts_api::services::classifier::{
    ClassificationError, ClassificationRequest, Classifier, ModelAnalysis, ModelSentiment,
};
use sts_api::services::{CoordinatorSettings, Prioritizer, ScrapeCoordinator};
use sts_api::sources::{AdapterRegistry, SourceAdapter, SourceError, SourceRequest};
use sts_api::store::TaskStore;
use sts_api::AppState;
use sts_common::events::EventBus;

// ============================================================================
// Stub adapter
// ============================================================================

/// Adapter returning `records` canned records of its own kind, or failing
pub struct StubAdapter {
    kind: SourceKind,
    records: usize,
    failure: Option<u16>,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
}

impl StubAdapter {
    pub fn new(kind: SourceKind, records: usize) -> Self {
        Self {
            kind,
            records,
            failure: None,
            delay: Duration::ZERO,
            gate: None,
        }
    }

    /// Fails with the given HTTP status
    pub fn failing(kind: SourceKind, status: u16) -> Self {
        Self {
            failure: Some(status),
            ..Self::new(kind, 0)
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Each fetch waits for a permit from `gate`
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }
}

pub fn record(kind: SourceKind, i: usize) -> ReviewRecord {
    match kind {
        SourceKind::GooglePlay => ReviewRecord::GooglePlay(GooglePlayReview {
            rating: Some(4.0),
            snippet: format!("Play review {}", i),
            likes: Some(i as i64),
            iso_date: None,
        }),
        SourceKind::AppleStore => ReviewRecord::AppleStore(AppleReview {
            title: format!("Title {}", i),
            text: format!("Apple review {}", i),
            rating: Some(2.0),
            review_date: None,
            reviewed_version: Some("1.0".to_string()),
        }),
        SourceKind::Reddit => ReviewRecord::Reddit(RedditPost {
            title: format!("Thread {}", i),
            url: format!("https://old.reddit.com/r/test/comments/{}/", i),
            posted: None,
            comment_count: 1,
            body_text: format!("Reddit body {}", i),
            comments: vec!["Agreed".to_string()],
        }),
        SourceKind::GoogleSearch => ReviewRecord::GoogleSearch(SearchResult {
            link: format!("https://reviews.example/{}", i),
            title: format!("Review site {}", i),
            snippet: format!("Search snippet {}", i),
            source: Some("Example".to_string()),
        }),
    }
}

#[async_trait::async_trait]
impl SourceAdapter for StubAdapter {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, request: &SourceRequest) -> Result<SourceBatch, SourceError> {
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(status) = self.failure {
            return Err(SourceError::Status(status, format!("{} unavailable", self.kind)));
        }
        let records = (0..self.records).map(|i| record(self.kind, i)).collect();
        Ok(SourceBatch::new(self.kind, request.query(), records))
    }
}

// ============================================================================
// Stub classifier
// ============================================================================

/// Classifier returning a fixed analysis
///
/// With a gate, every call waits for a permit first so tests can observe the
/// task while it is classifying.
pub struct StubClassifier {
    analysis: Option<ModelAnalysis>,
    gate: Option<Arc<Semaphore>>,
    pub calls: AtomicUsize,
}

impl StubClassifier {
    pub fn new(analysis: ModelAnalysis) -> Self {
        Self {
            analysis: Some(analysis),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            analysis: None,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn gated(analysis: ModelAnalysis, gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(analysis)
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Classifier for StubClassifier {
    async fn classify(
        &self,
        _request: &ClassificationRequest,
    ) -> Result<ModelAnalysis, ClassificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| ClassificationError::Transport(e.to_string()))?;
            permit.forget();
        }
        self.analysis
            .clone()
            .ok_or_else(|| ClassificationError::Schema("missing field `bugs`".to_string()))
    }
}

pub fn finding(finding_type: FindingType, title: &str, frequency: u32, severity: Severity) -> Finding {
    Finding {
        finding_type,
        category: "general".to_string(),
        title: title.to_string(),
        description: format!("{} reported by users", title),
        frequency,
        severity,
        sample_reviews: vec![format!("\"{}\" again", title)],
        recommendation: String::new(),
        priority_score: 6,
        sources: vec!["reddit".to_string()],
    }
}

/// Two bugs, a requirement and a positive review
pub fn sample_analysis() -> ModelAnalysis {
    ModelAnalysis {
        overall_sentiment: ModelSentiment {
            positive_percentage: 45.0,
            negative_percentage: 40.0,
            neutral_percentage: 15.0,
        },
        bugs: vec![
            finding(FindingType::Bug, "Crash on startup", 12, Severity::Critical),
            finding(FindingType::Bug, "Playback stutters offline", 5, Severity::Medium),
        ],
        requirements: vec![finding(FindingType::Requirement, "Offline mode", 8, Severity::High)],
        positive_reviews: vec![finding(FindingType::PositiveReview, "Great playlists", 20, Severity::Low)],
        key_insights: vec!["Stability drives most negative reviews".to_string()],
        ..ModelAnalysis::default()
    }
}

/// Empty findings with a valid sentiment split
pub fn empty_analysis() -> ModelAnalysis {
    ModelAnalysis {
        overall_sentiment: ModelSentiment {
            positive_percentage: 100.0,
            negative_percentage: 0.0,
            neutral_percentage: 0.0,
        },
        ..ModelAnalysis::default()
    }
}

// ============================================================================
// App construction
// ============================================================================

pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.coordinator = CoordinatorSettings {
        source_timeout: Duration::from_millis(500),
        analysis: AnalysisSettings {
            max_chars_per_request: 600_000,
            batch_delay: Duration::ZERO,
        },
    };
    config
}

pub fn test_store() -> TaskStore {
    TaskStore::in_memory(Duration::from_secs(3600), EventBus::new(256))
}

/// App state over an in-memory store with the given adapters and classifier
pub fn test_state(adapters: Vec<StubAdapter>, classifier: Arc<dyn Classifier>) -> AppState {
    let store = test_store();
    let registry = adapters.into_iter().fold(AdapterRegistry::new(), |registry, adapter| {
        registry.register(Arc::new(adapter))
    });
    let config = test_config();
    let coordinator = ScrapeCoordinator::new(
        store.clone(),
        registry,
        classifier,
        config.coordinator.clone(),
    );
    let prioritizer = Prioritizer::new(store.clone(), None);
    AppState::new(store, coordinator, prioritizer, config)
}

/// All four sources succeeding with a few records each
pub fn all_sources(records: usize) -> Vec<StubAdapter> {
    SourceKind::ALL
        .iter()
        .map(|kind| StubAdapter::new(*kind, records))
        .collect()
}

/// Poll until the task is terminal
pub async fn wait_for_terminal(store: &TaskStore, task_id: &str) -> Task {
    for _ in 0..200 {
        let task = store.get(task_id).await.expect("task should exist");
        if task.status.is_terminal() {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {} did not finish", task_id);
}

// ============================================================================
// HTTP helpers
// ============================================================================

/// Send a request through the router and decode the JSON body
pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}
