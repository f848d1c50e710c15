//! Task store client.
//!
//! The bridge only needs a narrow slice of the shared `tasks` table: find the
//! next queued task, read a row or its log, append to the log and merge-patch
//! fields. `TaskStore` captures that contract; `SupabaseStore` is the
//! production implementation and `MemoryStore` backs tests.

pub mod memory;
pub mod models;
pub mod supabase;

use async_trait::async_trait;

use crate::errors::StoreError;
use models::{LogEntry, Task, TaskPatch};

pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

/// Abstraction over the remote task table for testability.
/// Real implementation: `SupabaseStore`. Test double: `MemoryStore`.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// The single oldest task with a tag other than `none` in `queued` status.
    async fn fetch_eligible(&self) -> Result<Option<Task>, StoreError>;

    async fn get_task(&self, id: &str) -> Result<Task, StoreError>;

    async fn read_log(&self, id: &str) -> Result<Vec<LogEntry>, StoreError>;

    /// Append one entry to the end of the task's `automation_log`.
    async fn append_log(&self, id: &str, entry: &LogEntry) -> Result<(), StoreError>;

    /// Merge `patch` into the row and stamp `updated_at`.
    async fn update_fields(&self, id: &str, patch: &TaskPatch) -> Result<(), StoreError>;
}
