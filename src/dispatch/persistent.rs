//! Persistent interactive shell sessions.
//!
//! A persistent session keeps one shell alive across many commands. There
//! is no out-of-band exit code or cwd for commands run inside a shell, so
//! completion is detected by the shell returning to its prompt, and the
//! working directory is re-probed in-band after every command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::outcome::CommandOutcome;
use crate::config::Config;
use crate::error::ShellRelayError;
use crate::expect::{shell_prompts, ExpectOutcome};
use crate::output::OutputSanitizer;
use crate::pty::{ProcessHandle, PtySize, SpawnOptions};
use crate::session::{
    CwdProbe, Session, SessionId, SessionKind, SessionRegistry, SessionSummary,
};
use crate::Result;

/// Options for creating a persistent shell.
#[derive(Debug, Clone, Default)]
pub struct TerminalOptions {
    /// Initial working directory.
    pub working_dir: Option<PathBuf>,
    /// Shell binary override.
    pub shell: Option<String>,
    /// Terminal geometry override.
    pub size: Option<PtySize>,
}

/// Dispatcher for long-lived interactive shells.
#[derive(Clone)]
pub struct TerminalDispatcher {
    registry: Arc<SessionRegistry>,
    config: Arc<Config>,
}

impl TerminalDispatcher {
    /// Create a dispatcher over its own session pool.
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            config,
        }
    }

    /// Spawn a new persistent shell and wait for its first prompt.
    ///
    /// Returns the session id and the probed working directory. A shell
    /// that exits during startup is an error, not a session.
    pub fn create(&self, opts: &TerminalOptions) -> Result<(SessionId, Option<PathBuf>)> {
        let shell = opts
            .shell
            .as_deref()
            .or(self.config.terminal.shell.as_deref());
        let mut spawn = SpawnOptions::interactive_shell(shell);
        if let Some(dir) = &opts.working_dir {
            spawn = spawn.working_dir(dir);
        }
        if let Some(size) = opts.size {
            spawn = spawn.size(size);
        }

        let handle = ProcessHandle::spawn(spawn)?;
        let mut session = Session::new(SessionKind::PersistentShell, handle);

        match session.expector.expect(
            &mut session.handle,
            &shell_prompts(),
            self.config.prompt_timeout(),
        ) {
            ExpectOutcome::Eof { before, .. } => {
                let detail = OutputSanitizer::clean_str(&before, None);
                return Err(ShellRelayError::Spawn(format!(
                    "shell exited during startup: {}",
                    detail
                )));
            }
            ExpectOutcome::Timeout { .. } => {
                // Prompt detection is heuristic; a quiet shell is still
                // usable.
                debug!("no initial prompt detected within the wait window");
            }
            ExpectOutcome::Match(_) => {}
        }

        let cwd = probe_cwd(&mut session, self.config.cwd_probe());
        if let Some(dir) = &cwd {
            session.context.set_cwd(dir);
        } else if let Some(dir) = &opts.working_dir {
            session.context.set_cwd(dir);
        }

        let probed = session.context.cwd().cloned();
        let id = self.registry.insert(session)?;
        Ok((id, probed))
    }

    /// Run one command in the shell and wait for the prompt to return.
    ///
    /// Completion means "the prompt came back"; there is no per-command
    /// exit code. The working directory is re-probed after each command.
    pub fn execute(
        &self,
        id: &SessionId,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutcome> {
        let wait = self.config.effective_terminal_timeout(timeout);
        let cwd_probe = self.config.cwd_probe();
        let command_owned = command.to_string();

        let (outcome, finished) = self.registry.with_session(id, |s| {
            if let Err(e) = s.handle.send_line(&command_owned) {
                return (CommandOutcome::failure(&command_owned, e.to_string()), false);
            }

            match s.expector.expect(&mut s.handle, &shell_prompts(), wait) {
                ExpectOutcome::Match(m) => {
                    let stdout = OutputSanitizer::clean_str(&m.before, Some(&command_owned));
                    if let Some(dir) = probe_cwd(s, cwd_probe) {
                        s.context.set_cwd(dir);
                    }
                    s.context.record_execution(&command_owned, None);
                    (
                        CommandOutcome::prompt_reached(&command_owned, stdout, s.id),
                        false,
                    )
                }
                ExpectOutcome::Eof { before, exit_code } => {
                    // The shell itself died; the session is gone.
                    let stdout = OutputSanitizer::clean_str(&before, Some(&command_owned));
                    warn!(session = %s.id, "shell exited during command");
                    (
                        CommandOutcome::completed(&command_owned, stdout, exit_code),
                        true,
                    )
                }
                ExpectOutcome::Timeout { before } => {
                    let stdout = OutputSanitizer::clean_str(&before, Some(&command_owned));
                    (CommandOutcome::timed_out(&command_owned, stdout, s.id), false)
                }
            }
        })?;

        if finished {
            self.registry.remove(id)?;
        }
        Ok(outcome)
    }

    /// Best-effort working directory of a shell session.
    pub fn cwd(&self, id: &SessionId) -> Result<Option<PathBuf>> {
        self.registry.with_session(id, |s| s.context.cwd().cloned())
    }

    /// Close a shell session, force-terminating it. Idempotent.
    pub fn close(&self, id: &SessionId) -> Result<bool> {
        self.registry.close(id)
    }

    /// Summaries of live shell sessions.
    pub fn list(&self) -> Result<Vec<SessionSummary>> {
        self.registry.list()
    }

    /// Number of live shell sessions.
    pub fn count(&self) -> usize {
        self.registry.count()
    }

    /// Evict sessions idle longer than `max_age`.
    pub fn reap_idle(&self, max_age: Duration) -> Result<usize> {
        self.registry.reap_idle(max_age)
    }

    /// Force-terminate every shell session.
    pub fn shutdown(&self) -> usize {
        self.registry.shutdown()
    }
}

/// Probe the working directory in-band: send the probe command and parse
/// the text before the next prompt. `None` when nothing parseable arrives.
pub(crate) fn probe_cwd(s: &mut Session, timeout: Duration) -> Option<PathBuf> {
    s.handle.send_line(CwdProbe::command()).ok()?;
    match s.expector.expect(&mut s.handle, &shell_prompts(), timeout) {
        ExpectOutcome::Match(m) => CwdProbe::parse_reply(&m.before),
        ExpectOutcome::Timeout { before } => CwdProbe::parse_reply(&before),
        ExpectOutcome::Eof { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::outcome::CommandStatus;
    use std::time::Instant;

    fn dispatcher() -> TerminalDispatcher {
        TerminalDispatcher::new(Arc::new(Config::default()))
    }

    #[test]
    #[cfg(unix)]
    fn test_create_and_execute() {
        let d = dispatcher();
        let (id, _cwd) = d.create(&TerminalOptions::default()).unwrap();
        assert_eq!(d.count(), 1);

        let outcome = d.execute(&id, "echo marker-123", None).unwrap();
        assert_eq!(outcome.status, CommandStatus::Completed, "{:?}", outcome);
        assert!(outcome.completed);
        assert!(outcome.stdout.contains("marker-123"), "{:?}", outcome);
        // No per-command exit code inside a shell.
        assert_eq!(outcome.return_code, None);
        // The shell survives the command.
        assert_eq!(d.count(), 1);

        d.shutdown();
    }

    #[test]
    #[cfg(unix)]
    fn test_create_probes_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher();
        let opts = TerminalOptions {
            working_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let (id, cwd) = d.create(&opts).unwrap();
        let cwd = cwd.unwrap();
        assert!(cwd.to_string_lossy().contains(
            &dir.path().file_name().unwrap().to_string_lossy().into_owned()
        ));
        d.close(&id).unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn test_cd_updates_probed_cwd() {
        let d = dispatcher();
        let (id, _) = d.create(&TerminalOptions::default()).unwrap();

        let outcome = d.execute(&id, "cd /tmp", None).unwrap();
        assert_eq!(outcome.status, CommandStatus::Completed, "{:?}", outcome);

        let cwd = d.cwd(&id).unwrap().unwrap();
        assert_eq!(cwd.to_string_lossy(), "/tmp");
        d.shutdown();
    }

    #[test]
    #[cfg(unix)]
    fn test_execute_timeout_retains_shell() {
        let d = dispatcher();
        let (id, _) = d.create(&TerminalOptions::default()).unwrap();

        let outcome = d
            .execute(&id, "sleep 30", Some(Duration::from_secs(1)))
            .unwrap();
        assert_eq!(outcome.status, CommandStatus::Timeout);
        assert!(outcome.error.is_some());
        assert_eq!(d.count(), 1);

        // Closing a busy shell is still bounded.
        let start = Instant::now();
        assert!(d.close(&id).unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    #[cfg(unix)]
    fn test_shell_exit_removes_session() {
        let d = dispatcher();
        let (id, _) = d.create(&TerminalOptions::default()).unwrap();

        let outcome = d.execute(&id, "exit 3", None).unwrap();
        assert_eq!(outcome.status, CommandStatus::Completed);
        assert!(outcome.completed);
        assert_eq!(d.count(), 0);
        // Closing afterwards is a no-op.
        assert!(!d.close(&id).unwrap());
    }

    #[test]
    fn test_execute_unknown_session() {
        let d = dispatcher();
        let result = d.execute(&SessionId::from_raw(999_999), "echo hi", None);
        assert!(matches!(
            result,
            Err(ShellRelayError::SessionNotFound(_))
        ));
    }
}
