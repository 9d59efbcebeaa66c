//! sts-api library interface
//!
//! Exposes the application state and router so integration tests can drive
//! the service without binding a socket.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod sources;
pub mod store;

pub use crate::error::{ApiError, ApiResult};

use axum::http::HeaderValue;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use sts_common::events::TaskEvent;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::config::ServiceConfig;
use crate::services::{Classifier, GeminiClassifier, Prioritizer, ScrapeCoordinator};
use crate::sources::{
    AdapterRegistry, AppleStoreAdapter, GooglePlayAdapter, GoogleSearchAdapter, RedditAdapter,
    SerpApiClient,
};
use crate::store::TaskStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Canonical task registry; every read path goes through it
    pub store: TaskStore,
    pub coordinator: ScrapeCoordinator,
    pub prioritizer: Prioritizer,
    pub config: Arc<ServiceConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Most recent task failure, reported by /health
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        store: TaskStore,
        coordinator: ScrapeCoordinator,
        prioritizer: Prioritizer,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            coordinator,
            prioritizer,
            config: Arc::new(config),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Wire the production adapters and the Gemini classifier from `config`
    pub fn from_config(config: ServiceConfig, store: TaskStore) -> anyhow::Result<Self> {
        let serpapi = Arc::new(SerpApiClient::new(
            config.serpapi_key.clone(),
            config.serpapi_base_url.clone(),
        )?);
        let adapters = AdapterRegistry::new()
            .register(Arc::new(GooglePlayAdapter::new(Arc::clone(&serpapi))))
            .register(Arc::new(AppleStoreAdapter::new(
                Arc::clone(&serpapi),
                config.apple_max_reviews,
            )))
            .register(Arc::new(RedditAdapter::new(config.reddit.clone())?))
            .register(Arc::new(GoogleSearchAdapter::new(serpapi)));

        let classifier: Arc<dyn Classifier> =
            Arc::new(GeminiClassifier::new(config.gemini.clone())?);

        let coordinator = ScrapeCoordinator::new(
            store.clone(),
            adapters,
            Arc::clone(&classifier),
            config.coordinator.clone(),
        );
        let effort_estimator = config.ai_effort_estimates.then_some(classifier);
        let prioritizer = Prioritizer::new(store.clone(), effort_estimator);

        Ok(Self::new(store, coordinator, prioritizer, config))
    }

    /// Record task failures into `last_error` until `shutdown` is cancelled
    pub fn spawn_error_recorder(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let mut rx = self.store.event_bus().subscribe();
        let last_error = Arc::clone(&self.last_error);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(TaskEvent::TaskFailed { task_id, error, .. }) => {
                            *last_error.write().await = Some(format!("Task {}: {}", task_id, error));
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "Error recorder lagged behind event bus");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            debug!("Error recorder stopped");
        })
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(parsed)
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    Router::new()
        .merge(api::health_routes())
        .merge(api::scrape_routes())
        .merge(api::task_routes())
        .merge(api::progress_routes())
        .merge(api::prioritize_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
