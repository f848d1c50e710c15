use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Handler, advance, prompts, record_failure, truncate};
use crate::config::ProjectConfig;
use crate::errors::HandlerError;
use crate::session::{SessionRequest, SessionRunner};
use crate::store::TaskStore;
use crate::store::models::{AutomationStatus, LogEntry, Task, TaskPatch};

/// Tools a project session may use: full file and shell access.
pub const PROJECT_TOOLS: [&str; 6] = ["Bash", "Read", "Write", "Edit", "Glob", "Grep"];

const OUTPUT_LIMIT: usize = 2000;
const NO_WORKDIR_MESSAGE: &str = "No project_tag or repo_path specified";

/// Runs project, refactor and infra tasks inside a known repository.
pub struct ProjectHandler {
    store: Arc<dyn TaskStore>,
    runner: Arc<dyn SessionRunner>,
    projects: HashMap<String, ProjectConfig>,
}

impl ProjectHandler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        runner: Arc<dyn SessionRunner>,
        projects: HashMap<String, ProjectConfig>,
    ) -> Self {
        Self {
            store,
            runner,
            projects,
        }
    }

    /// Where the task should run. The project mapping wins over a raw
    /// `repo_path` on the task.
    pub fn resolve(&self, task: &Task) -> Option<ProjectConfig> {
        let mapped = task
            .project_tag
            .as_deref()
            .and_then(|tag| self.projects.get(tag))
            .cloned();
        if mapped.is_some() {
            return mapped;
        }
        if let Some(tag) = task.project_tag.as_deref() {
            tracing::debug!(task_id = %task.id, project_tag = tag, "project tag not in mapping");
        }
        task.repo_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(|path| ProjectConfig::for_repo_path(path))
    }

    async fn execute(
        &self,
        task: &Task,
        project: &ProjectConfig,
        current: &mut AutomationStatus,
    ) -> Result<(), HandlerError> {
        advance(
            self.store.as_ref(),
            &task.id,
            current,
            AutomationStatus::Running,
            LogEntry::started(format!(
                "Project task started in {}",
                project.repo_path.display()
            )),
            TaskPatch::default(),
        )
        .await?;

        let prompt = prompts::for_project_tag(task.tag(), task, project);
        let request = SessionRequest::new(prompt, &project.repo_path).with_allowed_tools(PROJECT_TOOLS);
        let result = self.runner.run(request).await?;

        advance(
            self.store.as_ref(),
            &task.id,
            current,
            AutomationStatus::Done,
            LogEntry::completed("Project task completed successfully")
                .with_output(truncate(&result.output, OUTPUT_LIMIT)),
            TaskPatch::default(),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Handler for ProjectHandler {
    async fn handle(&self, task: &Task) -> Result<(), HandlerError> {
        tracing::info!(task_id = %task.id, tag = %task.tag(), title = %task.title, "processing project task");

        let Some(project) = self.resolve(task) else {
            tracing::warn!(task_id = %task.id, "{}", NO_WORKDIR_MESSAGE);
            record_failure(
                self.store.as_ref(),
                &task.id,
                AutomationStatus::Queued,
                NO_WORKDIR_MESSAGE,
            )
            .await;
            return Ok(());
        };

        let mut current = AutomationStatus::Queued;
        match self.execute(task, &project, &mut current).await {
            Ok(()) => {
                tracing::info!(task_id = %task.id, "project task completed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(task_id = %task.id, error = %e, "project task failed");
                record_failure(
                    self.store.as_ref(),
                    &task.id,
                    current,
                    &format!("Project task failed: {}", e),
                )
                .await;
                Ok(())
            }
        }
    }
}
