//! Manual retry: `task-bridge requeue <task-id>`.

use anyhow::{Context, Result};
use task_bridge::state;
use task_bridge::store::models::{AutomationStatus, LogEntry, TaskPatch};
use task_bridge::store::{SupabaseStore, TaskStore};

use super::super::Cli;
use super::load_config;

pub async fn cmd_requeue(cli: &Cli, task_id: &str) -> Result<()> {
    let config = load_config(cli)?;
    let store = SupabaseStore::new(&config.supabase_url, &config.supabase_service_key);

    let task = store
        .get_task(task_id)
        .await
        .with_context(|| format!("Failed to load task {}", task_id))?;

    if task.status() != AutomationStatus::Failed {
        anyhow::bail!(
            "Task {} is {}; only failed tasks can be requeued",
            task_id,
            task.status()
        );
    }

    state::transition(
        &store,
        task_id,
        AutomationStatus::Failed,
        AutomationStatus::Queued,
        LogEntry::progress("Requeued for another attempt"),
        TaskPatch::default(),
    )
    .await
    .with_context(|| format!("Failed to requeue task {}", task_id))?;

    println!(
        "{} {} ({})",
        console::style("Requeued").green(),
        task_id,
        task.title
    );
    Ok(())
}
