//! Per-tag task handlers.
//!
//! A handler owns one task from `queued` to a terminal status: it marks the
//! task running, builds the session request, runs it and records the result.
//! Failures are turned into a `failed` transition here, so the dispatcher only
//! ever sees errors the handler could not record.

pub mod project;
pub mod prompts;
pub mod research;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ProjectConfig;
use crate::errors::{HandlerError, StateError};
use crate::session::SessionRunner;
use crate::state;
use crate::store::TaskStore;
use crate::store::models::{AutomationStatus, AutomationTag, LogEntry, Task, TaskPatch};

pub use project::ProjectHandler;
pub use research::ResearchHandler;

/// Longest failure message stored in a log entry.
pub const ERROR_MESSAGE_LIMIT: usize = 500;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<(), HandlerError>;
}

/// Maps automation tags to handlers.
pub struct HandlerRegistry {
    research: ResearchHandler,
    project: ProjectHandler,
}

impl HandlerRegistry {
    pub fn new(
        store: Arc<dyn TaskStore>,
        runner: Arc<dyn SessionRunner>,
        projects: HashMap<String, ProjectConfig>,
    ) -> Self {
        Self {
            research: ResearchHandler::new(store.clone(), runner.clone()),
            project: ProjectHandler::new(store, runner, projects),
        }
    }

    pub fn resolve(&self, tag: &AutomationTag) -> Option<&dyn Handler> {
        match tag {
            AutomationTag::Research => Some(&self.research),
            t if t.is_project_class() => Some(&self.project),
            _ => None,
        }
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Move the task from `*current` to `to`, keeping `*current` in step with
/// the row.
///
/// Once the status write lands `*current` is `to`, even when the log append
/// after it fails; that failure is logged and dropped so the status is never
/// changed a second time to report it.
pub(crate) async fn advance(
    store: &dyn TaskStore,
    task_id: &str,
    current: &mut AutomationStatus,
    to: AutomationStatus,
    entry: LogEntry,
    extra: TaskPatch,
) -> Result<(), StateError> {
    match state::transition(store, task_id, *current, to, entry, extra).await {
        Ok(()) => {
            *current = to;
            Ok(())
        }
        Err(StateError::LogAppend { to, source }) => {
            *current = to;
            tracing::warn!(task_id, status = %to, error = %source, "status recorded without its log entry");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Record a failure for a task that is still `queued` or `running`.
pub(crate) async fn record_failure(
    store: &dyn TaskStore,
    task_id: &str,
    current: AutomationStatus,
    message: &str,
) {
    if state::is_terminal(current) {
        return;
    }
    state::transition_logged(
        store,
        task_id,
        current,
        AutomationStatus::Failed,
        LogEntry::error(truncate(message, ERROR_MESSAGE_LIMIT)),
        TaskPatch::default(),
    )
    .await;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Test doubles shared by handler and dispatcher tests.

    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::errors::{SessionError, StoreError};
    use crate::session::{SessionOutput, SessionRequest, SessionRunner};
    use crate::state::can_transition;
    use crate::store::models::{AutomationStatus, LogEntry, LogKind, Task, TaskPatch};
    use crate::store::{MemoryStore, TaskStore};

    pub enum Scripted {
        Succeed(String),
        Exit(i32, String),
        Timeout(String),
    }

    /// Session runner that records requests and answers from a script.
    pub struct MockRunner {
        outcome: Scripted,
        pub requests: Mutex<Vec<SessionRequest>>,
        /// Whether the working directory existed while the session ran.
        pub dir_existed: Mutex<Vec<bool>>,
    }

    impl MockRunner {
        pub fn new(outcome: Scripted) -> Self {
            Self {
                outcome,
                requests: Mutex::new(Vec::new()),
                dir_existed: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn working_dirs(&self) -> Vec<PathBuf> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.working_dir.clone())
                .collect()
        }
    }

    #[async_trait]
    impl SessionRunner for MockRunner {
        async fn run(&self, request: SessionRequest) -> Result<SessionOutput, SessionError> {
            self.dir_existed
                .lock()
                .unwrap()
                .push(request.working_dir.exists());
            self.requests.lock().unwrap().push(request);
            match &self.outcome {
                Scripted::Succeed(output) => Ok(SessionOutput {
                    output: output.clone(),
                    exit_code: 0,
                }),
                Scripted::Exit(code, output) => Err(SessionError::ProcessExit {
                    code: *code,
                    output: output.clone(),
                }),
                Scripted::Timeout(output) => Err(SessionError::Timeout {
                    after: Duration::from_millis(300_000),
                    output: output.clone(),
                }),
            }
        }
    }

    /// Task store whose writes fail for one chosen status or log entry kind.
    pub struct FaultyStore {
        pub inner: MemoryStore,
        fail_update_to: Option<AutomationStatus>,
        fail_append_kind: Option<LogKind>,
        status_writes: Mutex<Vec<AutomationStatus>>,
    }

    impl FaultyStore {
        pub fn new(tasks: impl IntoIterator<Item = Task>) -> Self {
            Self {
                inner: MemoryStore::with_tasks(tasks),
                fail_update_to: None,
                fail_append_kind: None,
                status_writes: Mutex::new(Vec::new()),
            }
        }

        pub fn failing_update_to(mut self, status: AutomationStatus) -> Self {
            self.fail_update_to = Some(status);
            self
        }

        pub fn failing_append_of(mut self, kind: LogKind) -> Self {
            self.fail_append_kind = Some(kind);
            self
        }

        /// Statuses that actually reached the row, in order.
        pub fn status_writes(&self) -> Vec<AutomationStatus> {
            self.status_writes.lock().unwrap().clone()
        }

        fn unavailable() -> StoreError {
            StoreError::Status {
                status: 503,
                body: "upstream unavailable".to_string(),
            }
        }
    }

    #[async_trait]
    impl TaskStore for FaultyStore {
        async fn fetch_eligible(&self) -> Result<Option<Task>, StoreError> {
            self.inner.fetch_eligible().await
        }

        async fn get_task(&self, id: &str) -> Result<Task, StoreError> {
            self.inner.get_task(id).await
        }

        async fn read_log(&self, id: &str) -> Result<Vec<LogEntry>, StoreError> {
            self.inner.read_log(id).await
        }

        async fn append_log(&self, id: &str, entry: &LogEntry) -> Result<(), StoreError> {
            if self.fail_append_kind == Some(entry.kind) {
                return Err(Self::unavailable());
            }
            self.inner.append_log(id, entry).await
        }

        async fn update_fields(&self, id: &str, patch: &TaskPatch) -> Result<(), StoreError> {
            if patch.automation_status.is_some() && patch.automation_status == self.fail_update_to {
                return Err(Self::unavailable());
            }
            self.inner.update_fields(id, patch).await?;
            if let Some(status) = patch.automation_status {
                self.status_writes.lock().unwrap().push(status);
            }
            Ok(())
        }
    }

    /// Assert every recorded status write is a legal edge from `start`.
    pub fn assert_legal_path(start: AutomationStatus, writes: &[AutomationStatus]) {
        let mut from = start;
        for &to in writes {
            assert!(
                can_transition(from, to),
                "illegal status write {} -> {} in {:?}",
                from,
                to,
                writes
            );
            from = to;
        }
    }
}
