use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Bridge settings as given on the command line or in the environment.
///
/// Every flag falls back to an environment variable, and `main` loads `.env`
/// before parsing, so a plain `.env` next to the binary is enough to run.
#[derive(Debug, Clone, Args)]
pub struct BridgeArgs {
    /// Supabase project URL
    #[arg(long, global = true, env = "SUPABASE_URL", default_value = "")]
    pub supabase_url: String,

    /// Supabase service role key
    #[arg(long, global = true, env = "SUPABASE_SERVICE_KEY", default_value = "", hide_env_values = true)]
    pub supabase_service_key: String,

    /// Milliseconds between polls for queued tasks
    #[arg(long, global = true, env = "POLL_INTERVAL_MS", default_value_t = 10_000)]
    pub poll_interval_ms: u64,

    /// Milliseconds a single Claude session may run before it is killed
    #[arg(long, global = true, env = "CLAUDE_TIMEOUT_MS", default_value_t = 300_000)]
    pub claude_timeout_ms: u64,

    /// Claude CLI command
    #[arg(long, global = true, env = "CLAUDE_CMD", default_value = "claude")]
    pub claude_cmd: String,

    /// TOML file mapping project tags to repositories
    #[arg(long, global = true, env = "BRIDGE_PROJECTS_FILE", default_value = "bridge.toml")]
    pub projects_file: PathBuf,

    /// Directory for daily-rolling log files (stderr only when unset)
    #[arg(long, global = true, env = "BRIDGE_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

/// Repository a project-class task runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub repo_path: PathBuf,
    #[serde(default = "default_test_command")]
    pub test_command: String,
    #[serde(default = "default_stack")]
    pub stack: String,
}

impl ProjectConfig {
    /// Settings for a task that names its repository directly.
    pub fn for_repo_path(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
            test_command: default_test_command(),
            stack: default_stack(),
        }
    }
}

fn default_test_command() -> String {
    "npm test".to_string()
}

fn default_stack() -> String {
    "Unknown".to_string()
}

#[derive(Debug, Default, Deserialize)]
struct ProjectsFile {
    #[serde(default)]
    projects: HashMap<String, ProjectConfig>,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub poll_interval: Duration,
    pub claude_timeout: Duration,
    pub claude_cmd: String,
    /// Project tag -> repository settings.
    pub projects: HashMap<String, ProjectConfig>,
    pub projects_file: PathBuf,
    pub log_dir: Option<PathBuf>,
}

impl BridgeConfig {
    /// Validate the arguments and read the project mapping.
    pub fn load(args: BridgeArgs) -> Result<Self, ConfigError> {
        if args.supabase_url.trim().is_empty() {
            return Err(ConfigError::Missing("SUPABASE_URL"));
        }
        if args.supabase_service_key.trim().is_empty() {
            return Err(ConfigError::Missing("SUPABASE_SERVICE_KEY"));
        }
        if args.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "POLL_INTERVAL_MS",
                message: "must be greater than zero".to_string(),
            });
        }
        if args.claude_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "CLAUDE_TIMEOUT_MS",
                message: "must be greater than zero".to_string(),
            });
        }
        if args.claude_cmd.trim().is_empty() {
            return Err(ConfigError::Missing("CLAUDE_CMD"));
        }

        let projects = load_projects(&args.projects_file)?;

        Ok(Self {
            supabase_url: args.supabase_url,
            supabase_service_key: args.supabase_service_key,
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            claude_timeout: Duration::from_millis(args.claude_timeout_ms),
            claude_cmd: args.claude_cmd,
            projects,
            projects_file: args.projects_file,
            log_dir: args.log_dir,
        })
    }
}

/// Read the project mapping. A missing file is an empty mapping.
pub fn load_projects(path: &Path) -> Result<HashMap<String, ProjectConfig>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no project mapping file");
            return Ok(HashMap::new());
        }
        Err(source) => {
            return Err(ConfigError::ProjectsRead {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let file: ProjectsFile = toml::from_str(&content).map_err(|source| ConfigError::ProjectsParse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file.projects)
}
