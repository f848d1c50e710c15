//! Configuration and agent check: `task-bridge check`.

use anyhow::Result;
use task_bridge::session::ClaudeSession;

use super::super::Cli;
use super::{ensure_agent, load_config};

pub async fn cmd_check(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;

    println!();
    println!("{}", console::style("Task Bridge Configuration").bold().cyan());
    println!("===========================");
    println!();
    println!("  supabase_url = \"{}\"", config.supabase_url);
    println!("  poll_interval_ms = {}", config.poll_interval.as_millis());
    println!("  claude_timeout_ms = {}", config.claude_timeout.as_millis());
    println!("  claude_cmd = \"{}\"", config.claude_cmd);
    match &config.log_dir {
        Some(dir) => println!("  log_dir = \"{}\"", dir.display()),
        None => println!("  log_dir = (stderr only)"),
    }
    println!();

    println!("Projects ({}):", config.projects_file.display());
    if config.projects.is_empty() {
        println!("  (none; project tasks need repo_path)");
    } else {
        let mut tags: Vec<_> = config.projects.keys().collect();
        tags.sort();
        for tag in tags {
            let project = &config.projects[tag];
            println!(
                "  {} -> {} [{}] `{}`",
                console::style(tag).bold(),
                project.repo_path.display(),
                project.stack,
                project.test_command
            );
        }
    }
    println!();

    let session = ClaudeSession::new(&config.claude_cmd, config.claude_timeout);
    ensure_agent(&session).await?;
    println!(
        "{} Claude CLI '{}' is available",
        console::style("✓").green(),
        session.command()
    );
    Ok(())
}
