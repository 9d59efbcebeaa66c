//! Task lifecycle type definitions
//!
//! Supporting types for scrape task progress tracking.

use serde::{Deserialize, Serialize};

/// Scrape task status
///
/// `Pending` → `Running` → (`Completed` | `Failed`). Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, coordinator not started yet
    Pending,
    /// Sources or classification in flight
    Running,
    /// Result stored
    Completed,
    /// Fatal error stored
    Failed,
}

impl TaskStatus {
    /// Check if status is terminal (no further mutation allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}
