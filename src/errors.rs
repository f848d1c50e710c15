//! Typed error hierarchy for the task bridge.
//!
//! One enum per subsystem:
//! - `StoreError`: task store reads and writes
//! - `SessionError`: agent subprocess execution
//! - `StateError`: illegal automation status transitions
//! - `HandlerError`: per-task handling failures (wraps the above)
//! - `ConfigError`: fatal startup configuration problems

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::store::models::AutomationStatus;

/// Errors from the task store client.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Task store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Task store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode task store response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Task {id} not found")]
    NotFound { id: String },
}

/// Errors from a single agent session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to start {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Claude exited with code {code}: {output}")]
    ProcessExit { code: i32, output: String },

    #[error("Claude was killed: {output}")]
    Killed { output: String },

    #[error("Claude timed out after {}ms: {output}", .after.as_millis())]
    Timeout { after: Duration, output: String },

    #[error("Failed to supervise Claude process: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the automation status state machine.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Illegal automation status transition {from} -> {to}")]
    IllegalTransition {
        from: AutomationStatus,
        to: AutomationStatus,
    },

    /// The status write landed; only the log entry after it was lost.
    #[error("Status changed to {to} but the log entry was not recorded: {source}")]
    LogAppend {
        to: AutomationStatus,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors escaping a handler. The dispatcher logs these and moves on.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Failed to prepare working directory {path}: {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Fatal configuration errors detected before the poll loop starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },

    #[error("Failed to read project mapping at {path}: {source}")]
    ProjectsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse project mapping at {path}: {source}")]
    ProjectsParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_error_spawn_carries_io_kind() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "claude not found");
        let err = SessionError::Spawn {
            command: "claude".to_string(),
            source: io_err,
        };
        match &err {
            SessionError::Spawn { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            _ => panic!("Expected Spawn variant"),
        }
        assert!(err.to_string().starts_with("Failed to start claude"));
    }

    #[test]
    fn session_error_timeout_mentions_budget() {
        let err = SessionError::Timeout {
            after: Duration::from_millis(1500),
            output: "partial".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("1500ms"));
        assert!(msg.contains("partial"));
    }

    #[test]
    fn state_error_names_both_states() {
        let err = StateError::IllegalTransition {
            from: AutomationStatus::Done,
            to: AutomationStatus::Running,
        };
        assert_eq!(
            err.to_string(),
            "Illegal automation status transition done -> running"
        );
    }

    #[test]
    fn state_error_log_append_keeps_written_status() {
        let err = StateError::LogAppend {
            to: AutomationStatus::Done,
            source: StoreError::NotFound { id: "t".into() },
        };
        assert!(matches!(
            err,
            StateError::LogAppend {
                to: AutomationStatus::Done,
                ..
            }
        ));
        assert!(err.to_string().starts_with("Status changed to done"));
    }

    #[test]
    fn handler_error_converts_from_session_error() {
        let inner = SessionError::ProcessExit {
            code: 2,
            output: "boom".to_string(),
        };
        let err: HandlerError = inner.into();
        assert!(matches!(
            err,
            HandlerError::Session(SessionError::ProcessExit { code: 2, .. })
        ));
        assert_eq!(err.to_string(), "Claude exited with code 2: boom");
    }

    #[test]
    fn config_error_missing_names_variable() {
        let err = ConfigError::Missing("SUPABASE_URL");
        assert_eq!(err.to_string(), "SUPABASE_URL is required");
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&StoreError::NotFound { id: "x".into() });
        assert_std_error(&SessionError::Killed { output: String::new() });
        assert_std_error(&ConfigError::Missing("X"));
    }
}
