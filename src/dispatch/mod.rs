//! Command dispatch: one-shot commands, persistent shells, and the shared
//! programs terminal, behind one facade.

mod oneshot;
mod outcome;
mod persistent;
mod programs;

pub use oneshot::{ExecuteOptions, OneShotDispatcher};
pub use outcome::{CommandOutcome, CommandStatus};
pub use persistent::{TerminalDispatcher, TerminalOptions};
pub use programs::ProgramsTerminal;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::Config;
use crate::error::ShellRelayError;
use crate::session::{SessionId, SessionSummary};
use crate::Result;

/// The top-level entry point: all three session pools behind one handle.
///
/// Cloning is cheap; every clone shares the same pools. The facade is
/// synchronous at its core; `*_async` wrappers run the blocking work on
/// the tokio blocking pool for async embedders.
#[derive(Clone)]
pub struct Relay {
    config: Arc<Config>,
    oneshot: OneShotDispatcher,
    terminals: TerminalDispatcher,
    programs: Arc<ProgramsTerminal>,
}

impl Relay {
    /// Build a relay from configuration.
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        Self {
            oneshot: OneShotDispatcher::new(Arc::clone(&config)),
            terminals: TerminalDispatcher::new(Arc::clone(&config)),
            programs: Arc::new(ProgramsTerminal::new(Arc::clone(&config))),
            config,
        }
    }

    /// Build a relay with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// The active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute a one-shot command, or respond to a session awaiting input.
    pub fn execute(
        &self,
        session_id: Option<SessionId>,
        command: &str,
        opts: &ExecuteOptions,
    ) -> Result<CommandOutcome> {
        self.oneshot.execute(session_id, command, opts)
    }

    /// Create a persistent shell session.
    pub fn terminal_create(&self, opts: &TerminalOptions) -> Result<(SessionId, Option<PathBuf>)> {
        self.terminals.create(opts)
    }

    /// Run a command in a persistent shell session.
    pub fn terminal_execute(
        &self,
        id: &SessionId,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutcome> {
        self.terminals.execute(id, command, timeout)
    }

    /// Working directory of a persistent shell session.
    pub fn terminal_cwd(&self, id: &SessionId) -> Result<Option<PathBuf>> {
        self.terminals.cwd(id)
    }

    /// Start (or restart) the shared programs terminal.
    pub fn programs_start(&self, dir: Option<&Path>) -> Result<(SessionId, Option<PathBuf>)> {
        self.programs.start(dir)
    }

    /// Run a command in the shared programs terminal.
    pub fn programs_execute(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutcome> {
        self.programs.execute(command, timeout)
    }

    /// Stop the shared programs terminal, if running.
    pub fn programs_stop(&self) -> bool {
        self.programs.stop()
    }

    /// Close a session in any pool. Idempotent across all of them.
    pub fn close(&self, id: &SessionId) -> Result<bool> {
        if self.oneshot.close(id)? {
            return Ok(true);
        }
        if self.terminals.close(id)? {
            return Ok(true);
        }
        if self.programs.current_id() == Some(*id) {
            return Ok(self.programs.stop());
        }
        Ok(false)
    }

    /// Summaries of every live session across all pools.
    pub fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries = self.oneshot.list()?;
        summaries.extend(self.terminals.list()?);
        if let Some(shared) = self.programs.summary() {
            summaries.push(shared);
        }
        Ok(summaries)
    }

    /// Total live session count across all pools.
    pub fn count(&self) -> usize {
        self.oneshot.count()
            + self.terminals.count()
            + usize::from(self.programs.is_running())
    }

    /// Evict idle sessions per the configured idle timeout.
    ///
    /// Eviction is only ever explicit: nothing runs this unless the
    /// embedder calls it. A no-op when no idle timeout is configured.
    pub fn reap_idle(&self) -> Result<usize> {
        let Some(max_age) = self.config.idle_timeout() else {
            return Ok(0);
        };
        let reaped = self.oneshot.reap_idle(max_age)? + self.terminals.reap_idle(max_age)?;
        Ok(reaped)
    }

    /// Force-terminate every session in every pool.
    pub fn shutdown(&self) -> usize {
        let mut closed = self.oneshot.shutdown() + self.terminals.shutdown();
        if self.programs.stop() {
            closed += 1;
        }
        info!(count = closed, "relay shut down");
        closed
    }

    /// Async wrapper around [`execute`](Self::execute).
    pub async fn execute_async(
        &self,
        session_id: Option<SessionId>,
        command: &str,
        opts: &ExecuteOptions,
    ) -> Result<CommandOutcome> {
        let relay = self.clone();
        let command = command.to_string();
        let opts = opts.clone();
        tokio::task::spawn_blocking(move || relay.execute(session_id, &command, &opts))
            .await
            .map_err(|e| ShellRelayError::Internal(e.to_string()))?
    }

    /// Async wrapper around [`terminal_execute`](Self::terminal_execute).
    pub async fn terminal_execute_async(
        &self,
        id: SessionId,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutcome> {
        let relay = self.clone();
        let command = command.to_string();
        tokio::task::spawn_blocking(move || relay.terminal_execute(&id, &command, timeout))
            .await
            .map_err(|e| ShellRelayError::Internal(e.to_string()))?
    }

    /// Async wrapper around [`terminal_create`](Self::terminal_create).
    pub async fn terminal_create_async(
        &self,
        opts: &TerminalOptions,
    ) -> Result<(SessionId, Option<PathBuf>)> {
        let relay = self.clone();
        let opts = opts.clone();
        tokio::task::spawn_blocking(move || relay.terminal_create(&opts))
            .await
            .map_err(|e| ShellRelayError::Internal(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_is_cheap_to_clone_and_shares_pools() {
        let relay = Relay::with_defaults();
        let clone = relay.clone();
        assert_eq!(relay.count(), 0);
        assert_eq!(clone.count(), 0);
    }

    #[test]
    fn test_reap_idle_noop_without_config() {
        let relay = Relay::with_defaults();
        assert_eq!(relay.reap_idle().unwrap(), 0);
    }

    #[test]
    #[cfg(unix)]
    fn test_close_unknown_session_everywhere() {
        let relay = Relay::with_defaults();
        assert!(!relay.close(&SessionId::from_raw(424_242)).unwrap());
    }
}
