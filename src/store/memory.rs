use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::TaskStore;
use super::models::{LogEntry, Task, TaskPatch};
use crate::errors::StoreError;

/// In-process task table.
///
/// Rows keep insertion order, which stands in for `created_at` ordering.
/// Every mutation happens under one lock, so appends never lose entries.
#[derive(Default)]
pub struct MemoryStore {
    tasks: Mutex<Vec<Task>>,
    fetch_calls: AtomicUsize,
    update_calls: AtomicUsize,
    append_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Snapshot of a row, if present.
    pub async fn snapshot(&self, id: &str) -> Option<Task> {
        self.tasks.lock().await.iter().find(|t| t.id == id).cloned()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn fetch_eligible(&self) -> Result<Option<Task>, StoreError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let tasks = self.tasks.lock().await;
        Ok(tasks.iter().find(|t| t.is_eligible()).cloned())
    }

    async fn get_task(&self, id: &str) -> Result<Task, StoreError> {
        self.snapshot(id)
            .await
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn read_log(&self, id: &str) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self.get_task(id).await?.automation_log)
    }

    async fn append_log(&self, id: &str, entry: &LogEntry) -> Result<(), StoreError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        let mut tasks = self.tasks.lock().await;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        task.automation_log.push(entry.clone());
        task.updated_at = Some(Utc::now().to_rfc3339());
        Ok(())
    }

    async fn update_fields(&self, id: &str, patch: &TaskPatch) -> Result<(), StoreError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut tasks = self.tasks.lock().await;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        if let Some(status) = patch.automation_status {
            task.automation_status = Some(status);
        }
        if let Some(ref description) = patch.description {
            task.description = Some(description.clone());
        }
        task.updated_at = Some(Utc::now().to_rfc3339());
        Ok(())
    }
}
