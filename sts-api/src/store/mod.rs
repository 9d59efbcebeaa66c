//! Task store with TTL expiry
//!
//! `TaskStore` owns the task lifecycle rules (monotonic progress, terminal
//! immutability, single result write) and publishes a `TaskEvent` for every
//! committed change. Persistence is delegated to a `TaskBackend`:
//!
//! - `memory://` → [`MemoryTaskBackend`]
//! - `sqlite::memory:` / `sqlite://path` → [`SqliteTaskBackend`]
//!
//! Every mutation is a read-modify-write of the whole record under a per-task
//! lock, and the event is published before the lock is released, so each
//! subscriber sees a task's events in commit order.

mod memory;
mod sqlite;

pub use memory::MemoryTaskBackend;
pub use sqlite::SqliteTaskBackend;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use sts_common::events::{EventBus, TaskEvent, TaskStatus};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{AnalysisResult, SourceKind, Task, TaskUpdate};

/// Task store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Unknown or expired task id
    #[error("Task not found: {0}")]
    NotFound(String),

    /// Mutation attempted on a completed/failed task
    #[error("Task {0} is already {1}")]
    Terminal(String, TaskStatus),

    #[error("Invalid task update: {0}")]
    InvalidUpdate(String),

    #[error("Unsupported store URL: {0}")]
    UnsupportedUrl(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Task record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence for task records
///
/// Implementations store whole records; `replace` must never expose a
/// partially written record to a concurrent `load`.
#[async_trait::async_trait]
pub trait TaskBackend: Send + Sync {
    /// Backend name for logs and health output
    fn name(&self) -> &'static str;

    async fn insert(&self, task: &Task) -> Result<(), StoreError>;

    /// Load a record; unknown and expired records are both `None`
    async fn load(&self, task_id: &str, now: DateTime<Utc>) -> Result<Option<Task>, StoreError>;

    /// Replace an existing record wholesale
    async fn replace(&self, task: &Task) -> Result<(), StoreError>;

    /// Delete every record expired at `now`, returning the deleted ids
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError>;

    /// Connectivity check
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Open a backend from a store URL
pub async fn open_backend(store_url: &str) -> Result<Arc<dyn TaskBackend>, StoreError> {
    if store_url == "memory://" || store_url == "memory" {
        return Ok(Arc::new(MemoryTaskBackend::new()));
    }
    if store_url.starts_with("sqlite:") {
        let backend = SqliteTaskBackend::connect(store_url).await?;
        return Ok(Arc::new(backend));
    }
    Err(StoreError::UnsupportedUrl(store_url.to_string()))
}

/// Canonical task registry shared by the coordinator and all readers
#[derive(Clone)]
pub struct TaskStore {
    backend: Arc<dyn TaskBackend>,
    ttl: Duration,
    event_bus: EventBus,
    /// Per-task write locks, dropped when the task turns terminal or expires
    locks: Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl TaskStore {
    pub fn new(backend: Arc<dyn TaskBackend>, ttl: Duration, event_bus: EventBus) -> Self {
        Self {
            backend,
            ttl,
            event_bus,
            locks: Arc::new(std::sync::Mutex::new(HashMap::new())),
        }
    }

    /// In-memory store, mainly for tests
    pub fn in_memory(ttl: Duration, event_bus: EventBus) -> Self {
        Self::new(Arc::new(MemoryTaskBackend::new()), ttl, event_bus)
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Create a `pending` task and return its id
    pub async fn create(&self, sources: &[SourceKind]) -> Result<String, StoreError> {
        let task_id = Uuid::new_v4().to_string();
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| StoreError::InvalidUpdate(format!("TTL out of range: {}", e)))?;
        let task = Task::new(task_id.clone(), Utc::now(), ttl);

        self.backend.insert(&task).await?;
        self.event_bus.emit_lossy(TaskEvent::TaskCreated {
            task_id: task_id.clone(),
            sources: sources.iter().map(|s| s.as_str().to_string()).collect(),
            timestamp: task.created_at,
        });

        info!(task_id = %task_id, backend = self.backend.name(), "Task created");
        Ok(task_id)
    }

    /// Current record, or `NotFound` when unknown or past TTL
    pub async fn get(&self, task_id: &str) -> Result<Task, StoreError> {
        self.backend
            .load(task_id, Utc::now())
            .await?
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))
    }

    /// Apply a partial update to a non-terminal task
    ///
    /// Progress is clamped so it never decreases.
    pub async fn update(&self, task_id: &str, update: TaskUpdate) -> Result<Task, StoreError> {
        if let Some(status) = update.status {
            if status.is_terminal() {
                return Err(StoreError::InvalidUpdate(format!(
                    "status '{}' must be set through set_result/set_error",
                    status
                )));
            }
        }

        self.mutate(task_id, |task| {
            if let Some(status) = update.status {
                task.status = status;
            }
            if let Some(progress) = update.progress {
                task.progress = task.progress.max(progress.min(100));
            }
            if let Some(message) = update.message {
                task.message = message;
            }
        })
        .await
    }

    /// Store the result and transition to `completed` in one write
    pub async fn set_result(
        &self,
        task_id: &str,
        result: AnalysisResult,
    ) -> Result<Task, StoreError> {
        let task = self
            .mutate(task_id, |task| {
                task.status = TaskStatus::Completed;
                task.progress = 100;
                task.message = "Analysis complete".to_string();
                task.result = Some(result);
                task.completed_at = Some(Utc::now());
            })
            .await?;
        self.release_lock(task_id);
        Ok(task)
    }

    /// Store the error and transition to `failed`, keeping the last progress
    pub async fn set_error(
        &self,
        task_id: &str,
        error: impl Into<String>,
    ) -> Result<Task, StoreError> {
        let error = error.into();
        let task = self
            .mutate(task_id, |task| {
                task.status = TaskStatus::Failed;
                task.message = format!("Task failed: {}", error);
                task.error = Some(error);
                task.completed_at = Some(Utc::now());
            })
            .await?;
        self.release_lock(task_id);
        Ok(task)
    }

    /// Delete expired records; returns how many were removed
    pub async fn purge_expired(&self) -> Result<usize, StoreError> {
        let purged = self.backend.purge_expired(Utc::now()).await?;
        if !purged.is_empty() {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            for task_id in &purged {
                locks.remove(task_id);
            }
            debug!(count = purged.len(), "Expired tasks purged");
        }
        Ok(purged.len())
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.backend.ping().await
    }

    /// Spawn the periodic expiry sweep; stops when `shutdown` is cancelled
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Task sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = store.purge_expired().await {
                            warn!(error = %e, "Task sweep failed");
                        }
                    }
                }
            }
        })
    }

    async fn mutate<F>(&self, task_id: &str, apply: F) -> Result<Task, StoreError>
    where
        F: FnOnce(&mut Task),
    {
        let lock = self.lock_for(task_id);
        let _guard = lock.lock().await;

        let now = Utc::now();
        let mut task = match self.backend.load(task_id, now).await? {
            Some(task) => task,
            None => {
                self.release_lock(task_id);
                return Err(StoreError::NotFound(task_id.to_string()));
            }
        };

        if task.status.is_terminal() {
            self.release_lock(task_id);
            return Err(StoreError::Terminal(task_id.to_string(), task.status));
        }

        apply(&mut task);
        task.updated_at = now;
        task.version += 1;

        self.backend.replace(&task).await?;
        self.event_bus.emit_lossy(task.to_event());

        debug!(
            task_id = %task_id,
            status = %task.status,
            progress = task.progress,
            "Task updated"
        );
        Ok(task)
    }

    fn lock_for(&self, task_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Tasks with a live write lock entry
    pub fn lock_count(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn release_lock(&self, task_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.remove(task_id);
    }
}
