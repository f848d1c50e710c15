use std::process::ExitCode;

use clap::{Parser, Subcommand};
use task_bridge::config::BridgeArgs;
use task_bridge::logging::{self, LogFormat};

mod cmd;

#[derive(Parser)]
#[command(name = "task-bridge")]
#[command(version, about = "Dispatch queued tasks from Supabase to the Claude CLI")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log output format on stderr
    #[arg(long, value_enum, default_value_t = LogFormat::Human, global = true)]
    pub log_format: LogFormat,

    #[command(flatten)]
    pub bridge: BridgeArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll for queued tasks until interrupted (default)
    Run,
    /// Validate configuration and check the Claude CLI
    Check,
    /// Move a failed task back to queued
    Requeue {
        /// Task id
        task_id: String,
    },
    /// Run a single poll attempt and exit
    Once,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let _log_guard = match logging::init(cli.verbose, cli.log_format, cli.bridge.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{} {:#}", console::style("Error:").red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command.as_ref().unwrap_or(&Commands::Run) {
        Commands::Run => cmd::cmd_run(&cli).await,
        Commands::Check => cmd::cmd_check(&cli).await,
        Commands::Requeue { task_id } => cmd::cmd_requeue(&cli, task_id).await,
        Commands::Once => cmd::cmd_once(&cli).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", console::style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
