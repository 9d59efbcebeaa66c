//! Scrape task record
//!
//! A task moves `pending` → `running` → (`completed` | `failed`). The result is
//! written exactly once, together with the `completed` transition; nothing
//! about a terminal task changes afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sts_common::events::{TaskEvent, TaskStatus};

use super::{SentimentAnalysis, SourceKind};

/// Task record as stored and as returned by `GET /task/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub status: TaskStatus,
    /// 0-100, never decreases
    pub progress: u8,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Record is deleted at this instant regardless of status
    pub expires_at: DateTime<Utc>,
    /// Incremented by every committed change
    #[serde(default)]
    pub version: u64,
    pub result: Option<AnalysisResult>,
    pub error: Option<String>,
}

impl Task {
    /// New `pending` task at 0 %
    pub fn new(task_id: String, now: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Self {
            task_id,
            status: TaskStatus::Pending,
            progress: 0,
            message: "Task created".to_string(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            expires_at: now + ttl,
            version: 0,
            result: None,
            error: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Event describing the current state of this record
    pub fn to_event(&self) -> TaskEvent {
        match self.status {
            TaskStatus::Completed => TaskEvent::TaskCompleted {
                task_id: self.task_id.clone(),
                progress: self.progress,
                message: self.message.clone(),
                result_available: self.result.is_some(),
                version: self.version,
                timestamp: self.updated_at,
            },
            TaskStatus::Failed => TaskEvent::TaskFailed {
                task_id: self.task_id.clone(),
                progress: self.progress,
                error: self.error.clone().unwrap_or_default(),
                version: self.version,
                timestamp: self.updated_at,
            },
            status => TaskEvent::TaskProgress {
                task_id: self.task_id.clone(),
                status,
                progress: self.progress,
                message: self.message.clone(),
                version: self.version,
                timestamp: self.updated_at,
            },
        }
    }
}

/// Partial update for a non-terminal task
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    /// Only `Pending` or `Running`; terminal transitions go through
    /// `set_result`/`set_error`
    pub status: Option<TaskStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
}

impl TaskUpdate {
    pub fn progress(progress: u8, message: impl Into<String>) -> Self {
        Self {
            status: None,
            progress: Some(progress),
            message: Some(message.into()),
        }
    }

    pub fn running(progress: u8, message: impl Into<String>) -> Self {
        Self {
            status: Some(TaskStatus::Running),
            progress: Some(progress),
            message: Some(message.into()),
        }
    }
}

/// Per-source outcome of a scrape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub source: SourceKind,
    pub query: String,
    /// Records returned by the adapter
    pub fetched: usize,
    /// Records kept after cross-source deduplication
    pub after_dedup: usize,
    /// Failure reason when the adapter failed
    pub error: Option<String>,
}

/// Stored result of a completed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub product_name: String,
    /// Sources that returned data
    pub sources: Vec<SourceKind>,
    pub data_summary: Vec<SourceSummary>,
    pub sentiment_analysis: SentimentAnalysis,
    /// "single_request" or "batch_processing (N batches)"
    pub processing_mode: String,
}
