//! Automation status state machine.
//!
//! ```text
//!   idle ──▶ queued ──▶ running ──▶ done
//!              │  ▲        │
//!              │  └────────┼──── failed   (re-queue, external only)
//!              └──────────▶└───▶ failed
//! ```
//!
//! `done` and `failed` are terminal for the bridge itself. Every transition is
//! one `update_fields` (status plus any handler fields) followed by one
//! `append_log`; the two writes are not atomic together.

use crate::errors::StateError;
use crate::store::TaskStore;
use crate::store::models::{AutomationStatus, LogEntry, LogKind, TaskPatch};

/// Legal automation status edges.
pub fn can_transition(from: AutomationStatus, to: AutomationStatus) -> bool {
    use AutomationStatus::*;
    matches!(
        (from, to),
        (Idle, Queued)
            | (Queued, Running)
            | (Queued, Failed)
            | (Running, Done)
            | (Running, Failed)
            | (Failed, Queued)
    )
}

/// The log entry kind recorded when entering `to`.
pub fn entry_kind_for(to: AutomationStatus) -> LogKind {
    match to {
        AutomationStatus::Running => LogKind::Started,
        AutomationStatus::Done => LogKind::Completed,
        AutomationStatus::Failed => LogKind::Error,
        AutomationStatus::Idle | AutomationStatus::Queued => LogKind::Progress,
    }
}

/// Is the status terminal from the bridge's point of view?
pub fn is_terminal(status: AutomationStatus) -> bool {
    matches!(status, AutomationStatus::Done | AutomationStatus::Failed)
}

/// Move a task from `from` to `to`.
///
/// `extra` is merged into the same `update_fields` call that sets the status,
/// so handler results (e.g. research text) land in one write. The log entry
/// is appended afterwards. A failed append is reported as
/// `StateError::LogAppend`: the row is already in `to` at that point.
pub async fn transition(
    store: &dyn TaskStore,
    task_id: &str,
    from: AutomationStatus,
    to: AutomationStatus,
    entry: LogEntry,
    extra: TaskPatch,
) -> Result<(), StateError> {
    if !can_transition(from, to) {
        return Err(StateError::IllegalTransition { from, to });
    }
    debug_assert_eq!(entry.kind, entry_kind_for(to));

    let patch = TaskPatch {
        automation_status: Some(to),
        ..extra
    };
    store.update_fields(task_id, &patch).await?;
    if let Err(source) = store.append_log(task_id, &entry).await {
        return Err(StateError::LogAppend { to, source });
    }

    tracing::info!(task_id, from = %from, to = %to, "automation status changed");
    Ok(())
}

/// Like [`transition`], but failures are logged and swallowed. Used on the
/// paths where the handler has nothing better to do with a store error; the
/// task may be left stale until someone looks at it.
pub async fn transition_logged(
    store: &dyn TaskStore,
    task_id: &str,
    from: AutomationStatus,
    to: AutomationStatus,
    entry: LogEntry,
    extra: TaskPatch,
) -> bool {
    match transition(store, task_id, from, to, entry, extra).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(task_id, from = %from, to = %to, error = %e, "failed to record transition");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::store::models::{AutomationTag, Task};
    use AutomationStatus::*;

    const ALL: [AutomationStatus; 5] = [Idle, Queued, Running, Done, Failed];

    fn queued_task(id: &str) -> Task {
        let mut task = Task::new(id, "t");
        task.automation_tag = Some(AutomationTag::Project);
        task.automation_status = Some(Queued);
        task
    }

    #[test]
    fn test_legal_edges() {
        assert!(can_transition(Idle, Queued));
        assert!(can_transition(Queued, Running));
        assert!(can_transition(Running, Done));
        assert!(can_transition(Running, Failed));
        assert!(can_transition(Failed, Queued));
        assert!(can_transition(Queued, Failed));
    }

    #[test]
    fn test_done_is_terminal() {
        for to in ALL {
            assert!(!can_transition(Done, to), "done -> {} must be illegal", to);
        }
        assert!(is_terminal(Done));
        assert!(is_terminal(Failed));
        assert!(!is_terminal(Running));
    }

    #[test]
    fn test_failed_only_requeues() {
        let targets: Vec<_> = ALL.into_iter().filter(|to| can_transition(Failed, *to)).collect();
        assert_eq!(targets, vec![Queued]);
    }

    #[test]
    fn test_no_skipping_running_to_done() {
        assert!(!can_transition(Queued, Done));
        assert!(!can_transition(Idle, Running));
        assert!(!can_transition(Running, Queued));
    }

    #[tokio::test]
    async fn test_transition_writes_status_then_log() {
        let store = MemoryStore::with_tasks([queued_task("a")]);
        transition(
            &store,
            "a",
            Queued,
            Running,
            LogEntry::started("go"),
            TaskPatch::default(),
        )
        .await
        .unwrap();

        let task = store.snapshot("a").await.unwrap();
        assert_eq!(task.status(), Running);
        assert_eq!(task.automation_log.len(), 1);
        assert_eq!(task.automation_log[0].kind, LogKind::Started);
        assert_eq!(store.update_calls(), 1);
        assert_eq!(store.append_calls(), 1);
    }

    #[tokio::test]
    async fn test_transition_merges_extra_fields() {
        let store = MemoryStore::with_tasks([queued_task("a")]);
        transition(
            &store,
            "a",
            Queued,
            Running,
            LogEntry::started("go"),
            TaskPatch::default(),
        )
        .await
        .unwrap();
        transition(
            &store,
            "a",
            Running,
            Done,
            LogEntry::completed("ok"),
            TaskPatch::default().with_description("results"),
        )
        .await
        .unwrap();

        let task = store.snapshot("a").await.unwrap();
        assert_eq!(task.status(), Done);
        assert_eq!(task.description.as_deref(), Some("results"));
        // one update per transition, no separate description write
        assert_eq!(store.update_calls(), 2);
    }

    #[tokio::test]
    async fn test_illegal_transition_writes_nothing() {
        let store = MemoryStore::with_tasks([queued_task("a")]);
        let err = transition(
            &store,
            "a",
            Done,
            Running,
            LogEntry::started("again"),
            TaskPatch::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StateError::IllegalTransition { .. }));
        assert_eq!(store.update_calls(), 0);
        assert_eq!(store.append_calls(), 0);
    }

    #[tokio::test]
    async fn test_transition_logged_swallows_store_errors() {
        let store = MemoryStore::new();
        let ok = transition_logged(
            &store,
            "missing",
            Queued,
            Running,
            LogEntry::started("go"),
            TaskPatch::default(),
        )
        .await;
        assert!(!ok);
    }

    #[tokio::test]
    async fn test_lost_log_entry_reports_written_status() {
        use crate::handlers::testing::FaultyStore;

        let store = FaultyStore::new([queued_task("a")]).failing_append_of(LogKind::Started);
        let err = transition(
            &store,
            "a",
            Queued,
            Running,
            LogEntry::started("go"),
            TaskPatch::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StateError::LogAppend { to: Running, .. }));
        let task = store.inner.snapshot("a").await.unwrap();
        assert_eq!(task.status(), Running);
        assert!(task.automation_log.is_empty());
    }

    #[tokio::test]
    async fn test_failed_status_write_skips_log() {
        use crate::handlers::testing::FaultyStore;

        let store = FaultyStore::new([queued_task("a")]).failing_update_to(Running);
        let err = transition(
            &store,
            "a",
            Queued,
            Running,
            LogEntry::started("go"),
            TaskPatch::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StateError::Store(_)));
        let task = store.inner.snapshot("a").await.unwrap();
        assert_eq!(task.status(), Queued);
        assert!(task.automation_log.is_empty());
        assert_eq!(store.inner.append_calls(), 0);
    }
}
