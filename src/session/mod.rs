//! Agent session runner.
//!
//! One `run` call spawns exactly one `claude` process, drains its stdout and
//! stderr independently and resolves to the captured output or a
//! `SessionError`. A session is bounded by its timeout: when it fires the
//! process receives SIGTERM, then a hard kill after a short grace period.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::errors::SessionError;

/// Default per-session budget (5 minutes).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300_000);

const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(2);
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const STDERR_SEPARATOR: &str = "\n\nErrors:\n";

/// Everything needed to run one agent session.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub prompt: String,
    pub working_dir: PathBuf,
    /// Tool names passed as `--allowedTools a,b,c`. Empty means no flag.
    pub allowed_tools: Vec<String>,
    /// Overrides the runner's default timeout.
    pub timeout: Option<Duration>,
}

impl SessionRequest {
    pub fn new(prompt: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompt: prompt.into(),
            working_dir: working_dir.into(),
            allowed_tools: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_allowed_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutput {
    pub output: String,
    pub exit_code: i32,
}

/// Abstraction over agent execution for testability.
/// Real implementation: `ClaudeSession`.
#[async_trait]
pub trait SessionRunner: Send + Sync {
    async fn run(&self, request: SessionRequest) -> Result<SessionOutput, SessionError>;
}

/// How a session ended.
#[derive(Debug)]
enum Termination {
    Exited(ExitStatus),
    TimedOut,
}

/// Per-session lifecycle. The first termination recorded wins; anything
/// arriving afterwards is ignored.
#[derive(Debug)]
enum SessionState {
    Running { started: Instant },
    Terminated(Termination),
}

impl SessionState {
    fn start() -> Self {
        Self::Running {
            started: Instant::now(),
        }
    }

    fn settle(&mut self, termination: Termination) -> bool {
        match self {
            Self::Running { started } => {
                tracing::debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    ?termination,
                    "session settled"
                );
                *self = Self::Terminated(termination);
                true
            }
            Self::Terminated(_) => false,
        }
    }
}

/// Runs the Claude CLI as a subprocess.
pub struct ClaudeSession {
    claude_cmd: String,
    default_timeout: Duration,
    kill_grace: Duration,
}

impl ClaudeSession {
    pub fn new(claude_cmd: impl Into<String>, default_timeout: Duration) -> Self {
        Self {
            claude_cmd: claude_cmd.into(),
            default_timeout,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }

    /// How long to wait after SIGTERM (and for output pipes to drain) before
    /// giving up on the process.
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn command(&self) -> &str {
        &self.claude_cmd
    }

    /// Check the CLI with `--version`. Never errors; any failure is `false`.
    pub async fn is_available(&self) -> bool {
        let check = Command::new(&self.claude_cmd)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();
        match tokio::time::timeout(VERSION_CHECK_TIMEOUT, check).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                tracing::debug!(command = %self.claude_cmd, error = %e, "version check failed to start");
                false
            }
            Err(_) => {
                tracing::debug!(command = %self.claude_cmd, "version check timed out");
                false
            }
        }
    }

    /// Send SIGTERM, give the process `kill_grace` to exit, then kill it.
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                // SAFETY: `pid` is our own child and has not been reaped yet
                // (`id()` returns None once it has).
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }
                if tokio::time::timeout(self.kill_grace, child.wait())
                    .await
                    .is_ok()
                {
                    return;
                }
            }
        }
        if let Err(e) = child.start_kill() {
            tracing::warn!(error = %e, "failed to kill timed out claude process");
            return;
        }
        if tokio::time::timeout(self.kill_grace, child.wait())
            .await
            .is_err()
        {
            tracing::warn!("claude process did not exit after kill");
        }
    }
}

/// Build the CLI arguments for a request.
pub fn claude_args(request: &SessionRequest) -> Vec<String> {
    let mut args = vec![
        "--print".to_string(),
        "--dangerously-skip-permissions".to_string(),
        "-p".to_string(),
        request.prompt.clone(),
    ];
    if !request.allowed_tools.is_empty() {
        args.push("--allowedTools".to_string());
        args.push(request.allowed_tools.join(","));
    }
    args
}

type Sink = Arc<Mutex<Vec<u8>>>;

async fn drain<R>(mut reader: R, sink: Sink, stream: &'static str) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        let chunk = &buf[..n];
        tracing::info!(stream, "{}", String::from_utf8_lossy(chunk).trim_end());
        if let Ok(mut captured) = sink.lock() {
            captured.extend_from_slice(chunk);
        }
    }
}

fn take_text(sink: &Sink) -> String {
    sink.lock()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[async_trait]
impl SessionRunner for ClaudeSession {
    async fn run(&self, request: SessionRequest) -> Result<SessionOutput, SessionError> {
        let args = claude_args(&request);
        let timeout = request.timeout.unwrap_or(self.default_timeout);

        tracing::info!(working_dir = %request.working_dir.display(), "starting claude");
        tracing::info!(prompt = %preview(&request.prompt, 100), "claude prompt");

        let mut cmd = Command::new(&self.claude_cmd);
        cmd.args(&args)
            .current_dir(&request.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(home) = dirs::home_dir() {
            cmd.env("HOME", home);
        }

        let mut child = cmd.spawn().map_err(|source| SessionError::Spawn {
            command: self.claude_cmd.clone(),
            source,
        })?;

        let stdout_buf: Sink = Arc::default();
        let stderr_buf: Sink = Arc::default();
        let mut readers: Vec<JoinHandle<std::io::Result<()>>> = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(drain(stdout, stdout_buf.clone(), "stdout")));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(drain(stderr, stderr_buf.clone(), "stderr")));
        }

        let mut state = SessionState::start();
        let timed_out = tokio::select! {
            status = child.wait() => {
                state.settle(Termination::Exited(status?));
                false
            }
            _ = tokio::time::sleep(timeout) => state.settle(Termination::TimedOut),
        };
        if timed_out {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "claude timed out, terminating");
            self.terminate(&mut child).await;
        }

        // Pipes can outlive the process when it leaked grandchildren; keep
        // whatever arrived within the grace period.
        let drained = tokio::time::timeout(self.kill_grace, async {
            for reader in readers.iter_mut() {
                if let Ok(Err(e)) = reader.await {
                    tracing::debug!(error = %e, "output reader failed");
                }
            }
        })
        .await;
        if drained.is_err() {
            for reader in &readers {
                reader.abort();
            }
        }

        let output = take_text(&stdout_buf);
        let errors = take_text(&stderr_buf);
        let full_output = if errors.is_empty() {
            output.clone()
        } else {
            format!("{}{}{}", output, STDERR_SEPARATOR, errors)
        };

        match state {
            SessionState::Terminated(Termination::Exited(status)) => match status.code() {
                Some(0) => {
                    tracing::info!(output_chars = output.len(), "claude finished");
                    Ok(SessionOutput {
                        output,
                        exit_code: 0,
                    })
                }
                Some(code) => Err(SessionError::ProcessExit {
                    code,
                    output: full_output,
                }),
                None => Err(SessionError::Killed {
                    output: full_output,
                }),
            },
            SessionState::Terminated(Termination::TimedOut) => Err(SessionError::Timeout {
                after: timeout,
                output: full_output,
            }),
            SessionState::Running { .. } => Err(SessionError::Io(std::io::Error::other(
                "session ended without settling",
            ))),
        }
    }
}
