//! Poll loop and single-flight dispatch.
//!
//! Each tick asks the store for the oldest eligible task and hands it to the
//! handler for its tag. At most one task is in flight per process: the busy
//! flag is claimed before the fetch and released by `BusyGuard` on every exit
//! path, panics included.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::handlers::{ERROR_MESSAGE_LIMIT, HandlerRegistry, truncate};
use crate::state;
use crate::store::TaskStore;
use crate::store::models::{AutomationStatus, LogEntry, Task, TaskPatch};

/// What one poll attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Another dispatch is still running; nothing fetched.
    Busy,
    /// No eligible task.
    Idle,
    Dispatched { task_id: String },
    /// Task had no handler and was moved to `failed`.
    Rejected { task_id: String },
    FetchFailed,
}

pub struct Dispatcher {
    store: Arc<dyn TaskStore>,
    handlers: HandlerRegistry,
    busy: AtomicBool,
}

/// Clears the busy flag when dropped.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Dispatcher {
    pub fn new(store: Arc<dyn TaskStore>, handlers: HandlerRegistry) -> Self {
        Self {
            store,
            handlers,
            busy: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn try_claim(&self) -> Option<BusyGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(&self.busy))
    }

    /// One poll attempt: fetch at most one task and run it to completion.
    pub async fn poll_once(&self) -> PollOutcome {
        let Some(_guard) = self.try_claim() else {
            tracing::debug!("dispatch in progress, skipping poll");
            return PollOutcome::Busy;
        };

        let task = match self.store.fetch_eligible().await {
            Ok(Some(task)) => task,
            Ok(None) => return PollOutcome::Idle,
            Err(e) => {
                tracing::error!(error = %e, "failed to fetch queued tasks");
                return PollOutcome::FetchFailed;
            }
        };

        tracing::info!(task_id = %task.id, tag = %task.tag(), title = %task.title, "dispatching task");

        let Some(handler) = self.handlers.resolve(task.tag()) else {
            self.reject(&task).await;
            return PollOutcome::Rejected { task_id: task.id };
        };

        if let Err(e) = handler.handle(&task).await {
            tracing::error!(task_id = %task.id, error = %e, "handler error");
        }
        PollOutcome::Dispatched { task_id: task.id }
    }

    async fn reject(&self, task: &Task) {
        let message = format!("Unknown automation tag: {}", task.tag());
        tracing::warn!(task_id = %task.id, tag = %task.tag(), "no handler for tag");
        state::transition_logged(
            self.store.as_ref(),
            &task.id,
            AutomationStatus::Queued,
            AutomationStatus::Failed,
            LogEntry::error(truncate(&message, ERROR_MESSAGE_LIMIT)),
            TaskPatch::default(),
        )
        .await;
    }

    /// Poll every `interval` until `shutdown` resolves.
    ///
    /// Each tick runs on its own task, so a tick that lands during a long
    /// dispatch reports `Busy` instead of queueing behind it.
    pub async fn run<F>(self: Arc<Self>, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        tracing::info!(interval_ms = interval.as_millis() as u64, "poll loop started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested, leaving poll loop");
                    break;
                }
                _ = ticker.tick() => {
                    let dispatcher = Arc::clone(&self);
                    tokio::spawn(async move {
                        let outcome = dispatcher.poll_once().await;
                        tracing::debug!(?outcome, "poll finished");
                    });
                }
            }
        }
    }
}
