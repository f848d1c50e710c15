//! Poll loop commands: `task-bridge run` and `task-bridge once`.

use std::sync::Arc;

use anyhow::Result;
use task_bridge::config::BridgeConfig;
use task_bridge::dispatcher::{Dispatcher, PollOutcome};
use task_bridge::handlers::HandlerRegistry;
use task_bridge::session::{ClaudeSession, SessionRunner};
use task_bridge::store::{SupabaseStore, TaskStore};

use super::super::Cli;
use super::{ensure_agent, load_config};

fn build_dispatcher(config: &BridgeConfig, session: Arc<ClaudeSession>) -> Arc<Dispatcher> {
    let store: Arc<dyn TaskStore> = Arc::new(SupabaseStore::new(
        &config.supabase_url,
        &config.supabase_service_key,
    ));
    let runner: Arc<dyn SessionRunner> = session;
    let handlers = HandlerRegistry::new(store.clone(), runner, config.projects.clone());
    Arc::new(Dispatcher::new(store, handlers))
}

fn print_banner(config: &BridgeConfig) {
    eprintln!();
    eprintln!("{}", console::style("Task Bridge").bold().cyan());
    eprintln!(
        "  {} {}",
        console::style("Store:").dim(),
        config.supabase_url
    );
    eprintln!(
        "  {} every {}ms",
        console::style("Polling:").dim(),
        config.poll_interval.as_millis()
    );
    eprintln!(
        "  {} {} ({}ms timeout)",
        console::style("Agent:").dim(),
        config.claude_cmd,
        config.claude_timeout.as_millis()
    );
    eprintln!(
        "  {} {} mapped",
        console::style("Projects:").dim(),
        config.projects.len()
    );
    eprintln!();
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

pub async fn cmd_run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let session = Arc::new(ClaudeSession::new(&config.claude_cmd, config.claude_timeout));
    ensure_agent(&session).await?;

    print_banner(&config);
    tracing::info!(
        store = %config.supabase_url,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        projects = config.projects.len(),
        "task bridge started"
    );

    let dispatcher = build_dispatcher(&config, session);
    dispatcher.run(config.poll_interval, shutdown_signal()).await;

    tracing::info!("task bridge stopped");
    Ok(())
}

pub async fn cmd_once(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let session = Arc::new(ClaudeSession::new(&config.claude_cmd, config.claude_timeout));
    ensure_agent(&session).await?;

    let dispatcher = build_dispatcher(&config, session);
    match dispatcher.poll_once().await {
        PollOutcome::Idle => println!("No queued tasks."),
        PollOutcome::Dispatched { task_id } => {
            println!("{} {}", console::style("Dispatched").green(), task_id)
        }
        PollOutcome::Rejected { task_id } => {
            println!("{} {} (no handler for tag)", console::style("Rejected").yellow(), task_id)
        }
        PollOutcome::FetchFailed => anyhow::bail!("Failed to fetch queued tasks"),
        PollOutcome::Busy => println!("Dispatcher busy."),
    }
    Ok(())
}
