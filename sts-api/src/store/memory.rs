//! In-process task backend

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{StoreError, TaskBackend};
use crate::models::Task;

/// HashMap-backed backend; records are swapped whole under the write lock
#[derive(Default)]
pub struct MemoryTaskBackend {
    tasks: RwLock<HashMap<String, Task>>,
}

impl MemoryTaskBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TaskBackend for MemoryTaskBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, task: &Task) -> Result<(), StoreError> {
        self.tasks
            .write()
            .await
            .insert(task.task_id.clone(), task.clone());
        Ok(())
    }

    async fn load(&self, task_id: &str, now: DateTime<Utc>) -> Result<Option<Task>, StoreError> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .get(task_id)
            .filter(|task| !task.is_expired(now))
            .cloned())
    }

    async fn replace(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task.task_id) {
            Some(slot) => {
                *slot = task.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(task.task_id.clone())),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>, StoreError> {
        let mut tasks = self.tasks.write().await;
        let expired: Vec<String> = tasks
            .values()
            .filter(|task| task.is_expired(now))
            .map(|task| task.task_id.clone())
            .collect();
        for task_id in &expired {
            tasks.remove(task_id);
        }
        Ok(expired)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
