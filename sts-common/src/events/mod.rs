//! Event types for the STS event system
//!
//! Provides shared task lifecycle event definitions and the EventBus used to
//! fan progress updates out to WebSocket/SSE subscribers.

mod task_types;

pub use task_types::TaskStatus;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Task lifecycle events
///
/// Every event is emitted after the corresponding Task record has been
/// written, so an event never describes state a poller could not observe.
/// Serialized with an internal `type` tag for WebSocket/SSE transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaskEvent {
    /// Task record created (status `pending`, progress 0)
    TaskCreated {
        task_id: String,
        /// Enabled source names in launch order
        sources: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// Non-terminal progress step
    ///
    /// Triggers:
    /// - WebSocket/SSE: update progress bar and status line
    TaskProgress {
        task_id: String,
        status: TaskStatus,
        /// Percentage complete (0-100), never decreases for a given task
        progress: u8,
        /// Human-readable status message naming the current step
        message: String,
        /// Record version, incremented on every committed change
        version: u64,
        timestamp: DateTime<Utc>,
    },

    /// Task reached `completed`, result stored
    TaskCompleted {
        task_id: String,
        progress: u8,
        message: String,
        result_available: bool,
        version: u64,
        timestamp: DateTime<Utc>,
    },

    /// Task reached `failed`
    TaskFailed {
        task_id: String,
        /// Last progress value before the failure
        progress: u8,
        error: String,
        version: u64,
        timestamp: DateTime<Utc>,
    },
}

impl TaskEvent {
    /// Event type name (used as the SSE `event:` field)
    pub fn event_type(&self) -> &str {
        match self {
            TaskEvent::TaskCreated { .. } => "TaskCreated",
            TaskEvent::TaskProgress { .. } => "TaskProgress",
            TaskEvent::TaskCompleted { .. } => "TaskCompleted",
            TaskEvent::TaskFailed { .. } => "TaskFailed",
        }
    }

    /// Task this event belongs to
    pub fn task_id(&self) -> &str {
        match self {
            TaskEvent::TaskCreated { task_id, .. }
            | TaskEvent::TaskProgress { task_id, .. }
            | TaskEvent::TaskCompleted { task_id, .. }
            | TaskEvent::TaskFailed { task_id, .. } => task_id,
        }
    }

    /// Progress value carried by the event
    pub fn progress(&self) -> u8 {
        match self {
            TaskEvent::TaskCreated { .. } => 0,
            TaskEvent::TaskProgress { progress, .. }
            | TaskEvent::TaskCompleted { progress, .. }
            | TaskEvent::TaskFailed { progress, .. } => *progress,
        }
    }

    /// Status implied by the event
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskEvent::TaskCreated { .. } => TaskStatus::Pending,
            TaskEvent::TaskProgress { status, .. } => *status,
            TaskEvent::TaskCompleted { .. } => TaskStatus::Completed,
            TaskEvent::TaskFailed { .. } => TaskStatus::Failed,
        }
    }

    /// Record version this event describes; creation is version 0
    pub fn version(&self) -> u64 {
        match self {
            TaskEvent::TaskCreated { .. } => 0,
            TaskEvent::TaskProgress { version, .. }
            | TaskEvent::TaskCompleted { version, .. }
            | TaskEvent::TaskFailed { version, .. } => *version,
        }
    }

    /// Commit time of the change this event describes
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TaskEvent::TaskCreated { timestamp, .. }
            | TaskEvent::TaskProgress { timestamp, .. }
            | TaskEvent::TaskCompleted { timestamp, .. }
            | TaskEvent::TaskFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Whether this is the last event a task will ever emit
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskEvent::TaskCompleted { .. } | TaskEvent::TaskFailed { .. }
        )
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for task events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers, each seeing events in publish order
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use sts_common::events::{EventBus, TaskEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(TaskEvent::TaskCreated {
///     task_id: "abc".to_string(),
///     sources: vec!["reddit".to_string()],
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert_eq!(rx.try_recv().unwrap().task_id(), "abc");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TaskEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before lagging receivers
    ///   start losing the oldest ones
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: TaskEvent,
    ) -> Result<usize, broadcast::error::SendError<TaskEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Progress updates are always emitted this way: a task with nobody
    /// watching is the common case.
    pub fn emit_lossy(&self, event: TaskEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
