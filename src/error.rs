//! Error types for shell-relay.

use thiserror::Error;

/// Main error type for shell-relay operations.
#[derive(Error, Debug)]
pub enum ShellRelayError {
    /// Session with the given ID was not found.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Process spawn failed (binary missing, permission denied).
    ///
    /// This is fatal for the creation attempt; there is no retry.
    #[error("spawn failed: {0}")]
    Spawn(String),

    /// PTY-related error.
    #[error("PTY error: {0}")]
    Pty(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid prompt matcher pattern.
    #[error("invalid prompt pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Invalid session phase transition attempted.
    #[error("invalid phase transition from {from:?} to {to:?}")]
    InvalidPhaseTransition {
        from: crate::session::SessionPhase,
        to: crate::session::SessionPhase,
    },

    /// Internal lock was poisoned.
    #[error("internal lock poisoned")]
    LockPoisoned,

    /// Unexpected internal failure (e.g. a worker task aborted).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience Result type for shell-relay operations.
pub type Result<T> = std::result::Result<T, ShellRelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_not_found_display() {
        let err = ShellRelayError::SessionNotFound("sess-00000001".into());
        assert!(err.to_string().contains("sess-00000001"));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_spawn_display() {
        let err = ShellRelayError::Spawn("no such file".into());
        assert!(err.to_string().contains("spawn failed"));
        assert!(err.to_string().contains("no such file"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ShellRelayError = io_err.into();
        assert!(matches!(err, ShellRelayError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_pattern_error_conversion() {
        let bad = regex::Regex::new("(unclosed").unwrap_err();
        let err: ShellRelayError = bad.into();
        assert!(matches!(err, ShellRelayError::Pattern(_)));
    }
}
