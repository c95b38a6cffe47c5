//! Session execution context and working-directory probing.

use std::path::PathBuf;

/// Execution context for a command session.
///
/// Tracks the best-effort working directory, the last command executed,
/// and how many commands the session has run.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    /// Current working directory (best-effort probe result).
    cwd: Option<PathBuf>,
    /// Last command executed.
    last_command: Option<String>,
    /// Exit code of the last command, when one was observed.
    last_exit_code: Option<i32>,
    /// Command execution count.
    execution_count: u64,
}

impl SessionContext {
    /// Create a new empty session context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> Option<&PathBuf> {
        self.cwd.as_ref()
    }

    /// Set the current working directory.
    pub fn set_cwd(&mut self, cwd: impl Into<PathBuf>) {
        self.cwd = Some(cwd.into());
    }

    /// Get the last command executed.
    pub fn last_command(&self) -> Option<&str> {
        self.last_command.as_deref()
    }

    /// Get the exit code of the last command.
    pub fn last_exit_code(&self) -> Option<i32> {
        self.last_exit_code
    }

    /// Get the number of commands executed.
    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }

    /// Record a command execution result.
    pub fn record_execution(&mut self, command: impl Into<String>, exit_code: Option<i32>) {
        self.last_command = Some(command.into());
        self.last_exit_code = exit_code;
        self.execution_count += 1;
    }
}

/// In-band working-directory probe for persistent shells.
///
/// There is no out-of-band channel to a shell inside a PTY, so the cwd is
/// probed by sending a literal `pwd` and pattern-matching the reply.
pub struct CwdProbe;

impl CwdProbe {
    /// The command sent to probe the working directory.
    #[cfg(unix)]
    pub fn command() -> &'static str {
        "pwd"
    }

    /// The command sent to probe the working directory.
    #[cfg(windows)]
    pub fn command() -> &'static str {
        "cd"
    }

    /// Parse the probe reply: the first line starting with `/`.
    ///
    /// Known false positive: if unread command output itself starts with
    /// `/`, that line is misattributed as the reply. No stronger in-band
    /// signal exists.
    #[cfg(unix)]
    pub fn parse_reply(output: &str) -> Option<PathBuf> {
        output
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with('/'))
            .map(PathBuf::from)
    }

    /// Parse the probe reply: the first non-empty line.
    #[cfg(windows)]
    pub fn parse_reply(output: &str) -> Option<PathBuf> {
        output
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_new() {
        let ctx = SessionContext::new();
        assert!(ctx.cwd().is_none());
        assert!(ctx.last_command().is_none());
        assert_eq!(ctx.execution_count(), 0);
    }

    #[test]
    fn test_context_set_cwd() {
        let mut ctx = SessionContext::new();
        ctx.set_cwd("/home/user");
        assert_eq!(ctx.cwd(), Some(&PathBuf::from("/home/user")));
    }

    #[test]
    fn test_context_record_execution() {
        let mut ctx = SessionContext::new();
        ctx.record_execution("ls -la", Some(0));
        assert_eq!(ctx.last_command(), Some("ls -la"));
        assert_eq!(ctx.last_exit_code(), Some(0));
        assert_eq!(ctx.execution_count(), 1);

        ctx.record_execution("false", Some(1));
        assert_eq!(ctx.execution_count(), 2);
        assert_eq!(ctx.last_exit_code(), Some(1));
    }

    #[test]
    #[cfg(unix)]
    fn test_parse_reply_first_slash_line() {
        let output = "pwd\n/tmp\n";
        assert_eq!(CwdProbe::parse_reply(output), Some(PathBuf::from("/tmp")));
    }

    #[test]
    #[cfg(unix)]
    fn test_parse_reply_skips_echo_and_noise() {
        let output = "pwd\r\nsome noise\n/home/user/project\n";
        assert_eq!(
            CwdProbe::parse_reply(output),
            Some(PathBuf::from("/home/user/project"))
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_parse_reply_no_slash_line() {
        assert_eq!(CwdProbe::parse_reply("pwd\nnothing here\n"), None);
        assert_eq!(CwdProbe::parse_reply(""), None);
    }
}
