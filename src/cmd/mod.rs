//! CLI command implementations.
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `run`     | `Run`, `Once`    |
//! | `check`   | `Check`          |
//! | `requeue` | `Requeue`        |

pub mod check;
pub mod requeue;
pub mod run;

pub use check::cmd_check;
pub use requeue::cmd_requeue;
pub use run::{cmd_once, cmd_run};

use anyhow::{Context, Result};
use task_bridge::config::BridgeConfig;
use task_bridge::session::ClaudeSession;

use super::Cli;

/// Validate the flags and environment into a runtime config.
pub fn load_config(cli: &Cli) -> Result<BridgeConfig> {
    BridgeConfig::load(cli.bridge.clone()).context("Invalid configuration")
}

/// Fail unless `<claude_cmd> --version` succeeds.
pub async fn ensure_agent(session: &ClaudeSession) -> Result<()> {
    if !session.is_available().await {
        anyhow::bail!(
            "Claude CLI '{}' is not available. Install it or set CLAUDE_CMD.",
            session.command()
        );
    }
    Ok(())
}
