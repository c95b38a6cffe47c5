//! Command outcome wire types.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::session::SessionId;

/// What a dispatched command resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// Process exited; output and exit code captured.
    Completed,
    /// A prompt was detected; the process awaits caller input.
    WaitingForInput,
    /// The wait elapsed with no prompt and no exit. The session is kept so
    /// the caller can retry, respond, or close. Not a failure of the
    /// command itself.
    Timeout,
    /// The dispatch itself failed in a way that produced no session.
    Error,
}

/// Result of dispatching one command, in its external wire shape.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    /// Whether the command completed successfully.
    pub success: bool,
    /// The command as submitted by the caller.
    pub command: String,
    /// Cleaned output.
    pub stdout: String,
    /// Always empty: a PTY merges the child's streams.
    pub stderr: String,
    /// Exit code; `null` while the process is still running.
    pub return_code: Option<i32>,
    /// True when the process exited.
    pub completed: bool,
    /// True when the session is parked awaiting caller input.
    pub waiting_for_input: bool,
    /// Session to respond to or close, when one is retained.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Error message, present on timeout/error outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Operator hint, present on timeout outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Seconds since the Unix epoch when the outcome was produced.
    pub timestamp: u64,
    /// Resolved status. Internal discriminant; the booleans above carry
    /// the same information on the wire.
    #[serde(skip)]
    pub status: CommandStatus,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl CommandOutcome {
    /// Process exited with `return_code`.
    pub fn completed(command: impl Into<String>, stdout: String, return_code: Option<i32>) -> Self {
        Self {
            success: return_code == Some(0),
            command: command.into(),
            stdout,
            stderr: String::new(),
            return_code,
            completed: true,
            waiting_for_input: false,
            session_id: None,
            error: None,
            hint: None,
            timestamp: now_secs(),
            status: CommandStatus::Completed,
        }
    }

    /// A persistent shell returned to its prompt. The shell session stays
    /// alive, and no per-command exit code is observable in-band.
    pub fn prompt_reached(
        command: impl Into<String>,
        stdout: String,
        session_id: SessionId,
    ) -> Self {
        Self {
            success: true,
            command: command.into(),
            stdout,
            stderr: String::new(),
            return_code: None,
            completed: true,
            waiting_for_input: false,
            session_id: Some(session_id.to_string()),
            error: None,
            hint: None,
            timestamp: now_secs(),
            status: CommandStatus::Completed,
        }
    }

    /// A prompt was detected; the session is retained for input.
    pub fn waiting(command: impl Into<String>, stdout: String, session_id: SessionId) -> Self {
        Self {
            success: true,
            command: command.into(),
            stdout,
            stderr: String::new(),
            return_code: None,
            completed: false,
            waiting_for_input: true,
            session_id: Some(session_id.to_string()),
            error: None,
            hint: None,
            timestamp: now_secs(),
            status: CommandStatus::WaitingForInput,
        }
    }

    /// The wait elapsed; the session is retained.
    pub fn timed_out(command: impl Into<String>, stdout: String, session_id: SessionId) -> Self {
        Self {
            success: false,
            command: command.into(),
            stdout,
            stderr: String::new(),
            return_code: None,
            completed: false,
            waiting_for_input: true,
            session_id: Some(session_id.to_string()),
            error: Some("command did not finish within the timeout".to_string()),
            hint: Some(
                "the process is still running; respond with input, retry with a longer \
                 timeout, or close the session"
                    .to_string(),
            ),
            timestamp: now_secs(),
            status: CommandStatus::Timeout,
        }
    }

    /// Dispatch failed outright; no session survives.
    pub fn failure(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            command: command.into(),
            stdout: String::new(),
            stderr: String::new(),
            return_code: None,
            completed: false,
            waiting_for_input: false,
            session_id: None,
            error: Some(message.into()),
            hint: None,
            timestamp: now_secs(),
            status: CommandStatus::Error,
        }
    }
}
