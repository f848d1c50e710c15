//! Task automation bridge.
//!
//! Polls a shared Supabase `tasks` table for queued, tagged tasks and runs
//! each one through the Claude CLI, one at a time, recording progress in the
//! task's `automation_log`.
//!
//! - `store` reads and writes task rows
//! - `session` runs one bounded `claude` subprocess
//! - `state` owns the automation status state machine
//! - `handlers` turn a task into a session and record the result
//! - `dispatcher` polls and enforces single-flight execution

pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod handlers;
pub mod logging;
pub mod session;
pub mod state;
pub mod store;
