use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use super::{Handler, advance, prompts, record_failure, truncate};
use crate::errors::HandlerError;
use crate::session::{SessionRequest, SessionRunner};
use crate::store::TaskStore;
use crate::store::models::{AutomationStatus, LogEntry, Task, TaskPatch};

/// Tools a research session may use: read-only and web access.
pub const RESEARCH_TOOLS: [&str; 4] = ["WebSearch", "WebFetch", "Read", "Write"];

/// Separates the original description from appended research output.
pub const RESULTS_DELIMITER: &str = "\n\n---\n## Research Results\n";

const OUTPUT_LIMIT: usize = 1000;

/// Runs research tasks in a throwaway directory and appends the findings to
/// the task description.
pub struct ResearchHandler {
    store: Arc<dyn TaskStore>,
    runner: Arc<dyn SessionRunner>,
    /// Parent for the per-task scratch directory; system temp dir when unset.
    scratch_root: Option<PathBuf>,
}

impl ResearchHandler {
    pub fn new(store: Arc<dyn TaskStore>, runner: Arc<dyn SessionRunner>) -> Self {
        Self {
            store,
            runner,
            scratch_root: None,
        }
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    fn scratch_dir(&self, task: &Task) -> std::io::Result<tempfile::TempDir> {
        let prefix = format!("research-{}-", task.id);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    async fn execute(
        &self,
        task: &Task,
        dir: &Path,
        current: &mut AutomationStatus,
    ) -> Result<(), HandlerError> {
        advance(
            self.store.as_ref(),
            &task.id,
            current,
            AutomationStatus::Running,
            LogEntry::started("Research task started"),
            TaskPatch::default(),
        )
        .await?;

        let request = SessionRequest::new(prompts::research_prompt(task), dir)
            .with_allowed_tools(RESEARCH_TOOLS);
        let result = self.runner.run(request).await?;

        let description = format!(
            "{}{}{}",
            task.description.as_deref().unwrap_or(""),
            RESULTS_DELIMITER,
            result.output
        );
        advance(
            self.store.as_ref(),
            &task.id,
            current,
            AutomationStatus::Done,
            LogEntry::completed("Research completed successfully")
                .with_output(truncate(&result.output, OUTPUT_LIMIT)),
            TaskPatch::default().with_description(description),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Handler for ResearchHandler {
    async fn handle(&self, task: &Task) -> Result<(), HandlerError> {
        tracing::info!(task_id = %task.id, title = %task.title, "processing research task");

        let scratch = match self.scratch_dir(task) {
            Ok(dir) => dir,
            Err(e) => {
                let message = format!("Research failed: could not create working directory: {}", e);
                record_failure(
                    self.store.as_ref(),
                    &task.id,
                    AutomationStatus::Queued,
                    &message,
                )
                .await;
                return Err(HandlerError::WorkDir {
                    path: self
                        .scratch_root
                        .clone()
                        .unwrap_or_else(std::env::temp_dir),
                    source: e,
                });
            }
        };

        let mut current = AutomationStatus::Queued;
        let outcome = self.execute(task, scratch.path(), &mut current).await;

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            tracing::warn!(path = %scratch_path.display(), error = %e, "failed to remove research directory");
        }

        match outcome {
            Ok(()) => {
                tracing::info!(task_id = %task.id, "research task completed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(task_id = %task.id, error = %e, "research task failed");
                record_failure(
                    self.store.as_ref(),
                    &task.id,
                    current,
                    &format!("Research failed: {}", e),
                )
                .await;
                Ok(())
            }
        }
    }
}
