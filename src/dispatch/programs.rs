//! The shared programs terminal: a singleton shell rooted at a fixed
//! directory.
//!
//! Unlike the per-caller persistent pool, at most one of these exists at a
//! time. Starting a new one replaces (and terminates) the previous one.
//! When pinning is enabled, the configured directory always wins over
//! whatever the caller asked for.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use super::outcome::CommandOutcome;
use super::persistent::probe_cwd;
use crate::config::Config;
use crate::error::ShellRelayError;
use crate::expect::{shell_prompts, ExpectOutcome};
use crate::output::OutputSanitizer;
use crate::pty::{ProcessHandle, SpawnOptions};
use crate::session::{Session, SessionId, SessionKind, SessionSummary};
use crate::Result;

/// Setup line sent to the fresh shell: silence input echo and force a
/// predictable prompt.
const SHELL_SETUP: &str = "stty -echo 2>/dev/null; PS1='$ '";

/// The singleton shared-directory shell.
pub struct ProgramsTerminal {
    slot: Mutex<Option<Arc<Mutex<Session>>>>,
    config: Arc<Config>,
}

impl ProgramsTerminal {
    /// Create an empty (not yet started) terminal.
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            slot: Mutex::new(None),
            config,
        }
    }

    /// Resolve the directory the shell will run in.
    ///
    /// With pinning on, the configured directory wins and a differing
    /// request is logged and ignored. With pinning off, the request wins.
    fn resolve_dir(&self, requested: Option<&Path>) -> Option<PathBuf> {
        let pinned = self.config.terminal.programs_dir.as_ref().map(PathBuf::from);
        if self.config.terminal.pin_programs_dir {
            if let Some(pinned) = pinned {
                if let Some(req) = requested {
                    if req != pinned.as_path() {
                        warn!(
                            requested = %req.display(),
                            pinned = %pinned.display(),
                            "programs terminal is pinned; ignoring requested directory"
                        );
                    }
                }
                return Some(pinned);
            }
        }
        requested.map(Path::to_path_buf).or(pinned)
    }

    /// Start (or restart) the shared shell.
    ///
    /// Any previously running instance is force-terminated and replaced.
    /// Returns the new session id and the directory the shell runs in.
    pub fn start(&self, requested_dir: Option<&Path>) -> Result<(SessionId, Option<PathBuf>)> {
        let dir = self.resolve_dir(requested_dir);

        let shell = self.config.terminal.shell.as_deref();
        let mut spawn = SpawnOptions::interactive_shell(shell);
        if let Some(dir) = &dir {
            spawn = spawn.working_dir(dir);
        }

        let handle = ProcessHandle::spawn(spawn)?;
        let mut session = Session::new(SessionKind::SharedDirectoryShell, handle);

        let prompt_wait = self.config.prompt_timeout();
        match session
            .expector
            .expect(&mut session.handle, &shell_prompts(), prompt_wait)
        {
            ExpectOutcome::Eof { before, .. } => {
                let detail = OutputSanitizer::clean_str(&before, None);
                return Err(ShellRelayError::Spawn(format!(
                    "shared shell exited during startup: {}",
                    detail
                )));
            }
            ExpectOutcome::Match(_) | ExpectOutcome::Timeout { .. } => {}
        }

        // Normalize the shell: no input echo, fixed prompt. Wait for the
        // prompt to come back, then discard any remaining startup noise.
        if session.handle.send_line(SHELL_SETUP).is_ok() {
            let _ = session
                .expector
                .expect(&mut session.handle, &shell_prompts(), prompt_wait);
            let _ = session.expector.take_pending();
        }

        if let Some(probed) = probe_cwd(&mut session, self.config.cwd_probe()) {
            session.context.set_cwd(probed);
        } else if let Some(dir) = &dir {
            session.context.set_cwd(dir);
        }

        let id = session.id;
        let cwd = session.context.cwd().cloned();
        info!(session = %id, cwd = ?cwd, "programs terminal started");

        let previous = {
            let mut slot = self
                .slot
                .lock()
                .map_err(|_| ShellRelayError::LockPoisoned)?;
            slot.replace(Arc::new(Mutex::new(session)))
        };
        if let Some(previous) = previous {
            let mut old = previous
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            warn!(session = %old.id, "replacing running programs terminal");
            old.handle.terminate(true);
        }

        Ok((id, cwd))
    }

    fn current(&self) -> Result<Arc<Mutex<Session>>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| ShellRelayError::LockPoisoned)?;
        slot.clone()
            .ok_or_else(|| ShellRelayError::SessionNotFound("programs terminal".into()))
    }

    /// Run one command in the shared shell.
    pub fn execute(&self, command: &str, timeout: Option<Duration>) -> Result<CommandOutcome> {
        let entry = self.current()?;
        let wait = self.config.effective_terminal_timeout(timeout);
        let cwd_probe = self.config.cwd_probe();

        let mut s = entry.lock().map_err(|_| ShellRelayError::LockPoisoned)?;
        s.touch();

        if let Err(e) = s.handle.send_line(command) {
            return Ok(CommandOutcome::failure(command, e.to_string()));
        }

        let outcome = {
            let s = &mut *s;
            s.expector.expect(&mut s.handle, &shell_prompts(), wait)
        };
        match outcome {
            ExpectOutcome::Match(m) => {
                let stdout = OutputSanitizer::clean_str(&m.before, Some(command));
                if let Some(dir) = probe_cwd(&mut s, cwd_probe) {
                    s.context.set_cwd(dir);
                }
                s.context.record_execution(command, None);
                Ok(CommandOutcome::prompt_reached(command, stdout, s.id))
            }
            ExpectOutcome::Eof { before, exit_code } => {
                let stdout = OutputSanitizer::clean_str(&before, Some(command));
                warn!(session = %s.id, "programs terminal shell exited");
                drop(s);
                self.clear();
                Ok(CommandOutcome::completed(command, stdout, exit_code))
            }
            ExpectOutcome::Timeout { before } => {
                let stdout = OutputSanitizer::clean_str(&before, Some(command));
                Ok(CommandOutcome::timed_out(command, stdout, s.id))
            }
        }
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.take();
        }
    }

    /// Stop the shared shell if running. Idempotent; returns whether a
    /// shell was actually stopped.
    pub fn stop(&self) -> bool {
        let taken = self
            .slot
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());

        let Some(entry) = taken else {
            return false;
        };
        let mut session = entry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        session.handle.terminate(true);
        info!(session = %session.id, "programs terminal stopped");
        true
    }

    /// Id of the running shell, if any.
    pub fn current_id(&self) -> Option<SessionId> {
        let slot = self.slot.lock().ok()?;
        let entry = slot.as_ref()?;
        entry.lock().ok().map(|s| s.id)
    }

    /// Whether a shared shell is currently running.
    pub fn is_running(&self) -> bool {
        self.current_id().is_some()
    }

    /// Summary of the running shell, if any.
    pub fn summary(&self) -> Option<SessionSummary> {
        let slot = self.slot.lock().ok()?;
        let entry = slot.as_ref()?;
        entry.lock().ok().map(|s| s.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::outcome::CommandStatus;

    fn terminal() -> ProgramsTerminal {
        ProgramsTerminal::new(Arc::new(Config::default()))
    }

    fn terminal_pinned(dir: &Path) -> ProgramsTerminal {
        let mut config = Config::default();
        config.terminal.programs_dir = Some(dir.to_string_lossy().into_owned());
        ProgramsTerminal::new(Arc::new(config))
    }

    #[test]
    #[cfg(unix)]
    fn test_start_execute_stop() {
        let t = terminal();
        assert!(!t.is_running());

        let (id, _cwd) = t.start(None).unwrap();
        assert!(t.is_running());
        assert_eq!(t.current_id(), Some(id));

        let outcome = t.execute("echo shared-marker", None).unwrap();
        assert_eq!(outcome.status, CommandStatus::Completed, "{:?}", outcome);
        assert!(outcome.stdout.contains("shared-marker"), "{:?}", outcome);

        assert!(t.stop());
        assert!(!t.is_running());
        // Stop is idempotent.
        assert!(!t.stop());
    }

    #[test]
    #[cfg(unix)]
    fn test_execute_without_start() {
        let t = terminal();
        let result = t.execute("echo hi", None);
        assert!(matches!(
            result,
            Err(ShellRelayError::SessionNotFound(_))
        ));
    }

    #[test]
    #[cfg(unix)]
    fn test_restart_replaces_previous_shell() {
        let t = terminal();
        let (first, _) = t.start(None).unwrap();
        let (second, _) = t.start(None).unwrap();
        assert_ne!(first, second);
        assert_eq!(t.current_id(), Some(second));
        t.stop();
    }

    #[test]
    #[cfg(unix)]
    fn test_pinned_dir_overrides_request() {
        let pinned = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let t = terminal_pinned(pinned.path());

        let (_, cwd) = t.start(Some(other.path())).unwrap();
        let cwd = cwd.unwrap();
        let pinned_name = pinned
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert!(cwd.to_string_lossy().contains(&pinned_name), "{:?}", cwd);
        t.stop();
    }

    #[test]
    #[cfg(unix)]
    fn test_unpinned_request_wins() {
        let pinned = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.terminal.programs_dir = Some(pinned.path().to_string_lossy().into_owned());
        config.terminal.pin_programs_dir = false;
        let t = ProgramsTerminal::new(Arc::new(config));

        let (_, cwd) = t.start(Some(other.path())).unwrap();
        let cwd = cwd.unwrap();
        let other_name = other
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert!(cwd.to_string_lossy().contains(&other_name), "{:?}", cwd);
        t.stop();
    }
}
