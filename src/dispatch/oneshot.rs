//! One-shot privileged/interactive command dispatch.
//!
//! Each call spawns a fresh process in its own PTY and walks the phase
//! machine: `Created -> [AwaitingPassword] -> AwaitingCompletion ->
//! {Completed | WaitingForInput}`. A session that completed is removed
//! immediately; one parked at a prompt is retained until the caller
//! responds or closes it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::outcome::CommandOutcome;
use crate::config::Config;
use crate::expect::{confirmation_prompts, password_prompts, ExpectOutcome};
use crate::output::OutputSanitizer;
use crate::pty::{ProcessHandle, SpawnOptions};
use crate::session::{Session, SessionId, SessionKind, SessionPhase, SessionRegistry, SessionSummary};
use crate::Result;

/// Per-call options for one-shot execution.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Prefix the command with the privilege-elevation command.
    pub use_sudo: bool,
    /// Credential to inject when a password prompt is detected.
    pub password: Option<String>,
    /// Requested wait; clamped to the configured `[min, max]` range.
    pub timeout: Option<Duration>,
    /// Working directory override for this command.
    pub working_dir: Option<PathBuf>,
}

/// Dispatcher for one-shot interactive commands.
#[derive(Clone)]
pub struct OneShotDispatcher {
    registry: Arc<SessionRegistry>,
    config: Arc<Config>,
}

impl OneShotDispatcher {
    /// Create a dispatcher over its own session pool.
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            config,
        }
    }

    /// Execute a command.
    ///
    /// With `session_id` absent, a fresh session is spawned. With a
    /// session id, `command` is treated as input for a session parked in
    /// `WaitingForInput` (see [`respond`](Self::respond)).
    pub fn execute(
        &self,
        session_id: Option<SessionId>,
        command: &str,
        opts: &ExecuteOptions,
    ) -> Result<CommandOutcome> {
        match session_id {
            Some(id) => self.respond(&id, command, opts),
            None => self.launch(command, opts),
        }
    }

    fn launch(&self, command: &str, opts: &ExecuteOptions) -> Result<CommandOutcome> {
        let command_line = if opts.use_sudo {
            format!("sudo {}", command)
        } else {
            command.to_string()
        };

        let mut spawn = SpawnOptions::shell_command(&command_line);
        let working_dir = opts.working_dir.clone().or_else(|| {
            self.config
                .execution
                .working_dir_root
                .as_ref()
                .map(PathBuf::from)
        });
        if let Some(dir) = working_dir {
            spawn = spawn.working_dir(dir);
        }

        // Spawn failure is fatal for this call; it propagates as an error
        // rather than a structured outcome.
        let handle = ProcessHandle::spawn(spawn)?;
        let mut session = Session::new(SessionKind::OneShot, handle);
        session.context.record_execution(command, None);
        let id = self.registry.insert(session)?;

        let timeout = self.config.effective_timeout(opts.timeout);
        let password = opts.password.clone();
        let command_owned = command.to_string();

        let (outcome, finished) = self.registry.with_session(&id, |s| {
            let mut collected = String::new();

            if let Some(pw) = &password {
                let _ = s.phase.transition_to(SessionPhase::AwaitingPassword);
                match s.expector.expect(
                    &mut s.handle,
                    &password_prompts(),
                    self.config.password_probe(),
                ) {
                    ExpectOutcome::Match(m) => {
                        collected.push_str(&m.before);
                        collected.push_str(&m.matched);
                        if s.handle.send_line(pw).is_ok() {
                            s.password_sent = true;
                            info!(session = %s.id, "credential injected on password prompt");
                        }
                    }
                    ExpectOutcome::Eof { before, exit_code } => {
                        // Short command finished before any prompt could
                        // appear; short-circuit straight to completion.
                        let _ = s.phase.transition_to(SessionPhase::Completed);
                        let stdout = OutputSanitizer::clean_str(&before, None);
                        return (
                            CommandOutcome::completed(&command_owned, stdout, exit_code),
                            true,
                        );
                    }
                    ExpectOutcome::Timeout { before } => {
                        debug!(session = %s.id, "no password prompt within probe window");
                        collected.push_str(&before);
                    }
                }
            }

            let _ = s.phase.transition_to(SessionPhase::AwaitingCompletion);
            completion_wait(s, &command_owned, collected, timeout)
        })?;

        if finished {
            self.registry.remove(&id)?;
        }
        Ok(outcome)
    }

    /// Send one input line to a session parked in `WaitingForInput` and
    /// wait for completion again.
    pub fn respond(
        &self,
        id: &SessionId,
        input: &str,
        opts: &ExecuteOptions,
    ) -> Result<CommandOutcome> {
        let timeout = self.config.effective_timeout(opts.timeout);
        let input_owned = input.to_string();

        let (outcome, finished) = self.registry.with_session(id, |s| {
            let command = s.context.last_command().unwrap_or_default().to_string();

            if !s.phase.accepts_input() {
                return (
                    CommandOutcome::failure(&input_owned, "session is not awaiting input"),
                    false,
                );
            }
            if let Err(e) = s.handle.send_line(&input_owned) {
                return (CommandOutcome::failure(&input_owned, e.to_string()), false);
            }

            // The tail of the answered prompt may still sit in the
            // look-ahead buffer; fold it into the output now so it cannot
            // re-match as a fresh prompt.
            let stale = s.expector.take_pending();

            let _ = s.phase.transition_to(SessionPhase::AwaitingCompletion);
            completion_wait(s, &command, stale, timeout)
        })?;

        if finished {
            self.registry.remove(id)?;
        }
        Ok(outcome)
    }

    /// Close a session, force-terminating its process. Idempotent.
    pub fn close(&self, id: &SessionId) -> Result<bool> {
        self.registry.close(id)
    }

    /// Summaries of retained one-shot sessions.
    pub fn list(&self) -> Result<Vec<SessionSummary>> {
        self.registry.list()
    }

    /// Number of retained one-shot sessions.
    pub fn count(&self) -> usize {
        self.registry.count()
    }

    /// Evict sessions idle longer than `max_age`.
    pub fn reap_idle(&self, max_age: Duration) -> Result<usize> {
        self.registry.reap_idle(max_age)
    }

    /// Force-terminate every retained session.
    pub fn shutdown(&self) -> usize {
        self.registry.shutdown()
    }
}

/// Wait for the command to finish or ask for input.
///
/// EOF completes the session; a confirmation-style prompt or a bare
/// timeout both leave it parked in `WaitingForInput` (the process is still
/// running either way), but serialize differently for the caller.
fn completion_wait(
    s: &mut Session,
    command: &str,
    mut collected: String,
    timeout: Duration,
) -> (CommandOutcome, bool) {
    match s
        .expector
        .expect(&mut s.handle, &confirmation_prompts(), timeout)
    {
        ExpectOutcome::Eof { before, exit_code } => {
            collected.push_str(&before);
            let _ = s.phase.transition_to(SessionPhase::Completed);
            let stdout = OutputSanitizer::clean_str(&collected, None);
            (
                CommandOutcome::completed(command, stdout, exit_code),
                true,
            )
        }
        ExpectOutcome::Match(m) => {
            collected.push_str(&m.before);
            collected.push_str(&m.matched);
            let _ = s.phase.transition_to(SessionPhase::WaitingForInput);
            debug!(session = %s.id, kind = ?m.kind, "prompt detected, retaining session");
            let stdout = OutputSanitizer::clean_str(&collected, None);
            (CommandOutcome::waiting(command, stdout, s.id), false)
        }
        ExpectOutcome::Timeout { before } => {
            collected.push_str(&before);
            let _ = s.phase.transition_to(SessionPhase::WaitingForInput);
            let stdout = OutputSanitizer::clean_str(&collected, None);
            (CommandOutcome::timed_out(command, stdout, s.id), false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::outcome::CommandStatus;

    fn dispatcher() -> OneShotDispatcher {
        OneShotDispatcher::new(Arc::new(Config::default()))
    }

    #[test]
    #[cfg(unix)]
    fn test_echo_completes_immediately() {
        let d = dispatcher();
        let outcome = d
            .execute(None, "echo hello", &ExecuteOptions::default())
            .unwrap();

        assert_eq!(outcome.status, CommandStatus::Completed);
        assert!(outcome.success);
        assert_eq!(outcome.stdout.trim(), "hello");
        assert_eq!(outcome.return_code, Some(0));
        // Completed sessions are removed immediately.
        assert_eq!(d.count(), 0);
    }

    #[test]
    #[cfg(unix)]
    fn test_nonzero_exit_is_completed_not_error() {
        let d = dispatcher();
        let outcome = d
            .execute(None, "exit 5", &ExecuteOptions::default())
            .unwrap();

        assert_eq!(outcome.status, CommandStatus::Completed);
        assert!(!outcome.success);
        assert_eq!(outcome.return_code, Some(5));
        assert_eq!(d.count(), 0);
    }

    #[test]
    #[cfg(unix)]
    fn test_confirmation_prompt_parks_session() {
        let d = dispatcher();
        let outcome = d
            .execute(
                None,
                "printf 'Continue? (y/n) '; sleep 30",
                &ExecuteOptions::default(),
            )
            .unwrap();

        assert_eq!(outcome.status, CommandStatus::WaitingForInput);
        assert!(outcome.waiting_for_input);
        // "Continue" matches first; the rest of the prompt stays buffered.
        assert!(outcome.stdout.contains("Continue"));
        let id: SessionId = outcome.session_id.as_deref().unwrap().parse().unwrap();
        assert_eq!(d.count(), 1);

        assert!(d.close(&id).unwrap());
        assert_eq!(d.count(), 0);
    }

    #[test]
    #[cfg(unix)]
    fn test_bare_timeout_retains_session_with_hint() {
        let d = dispatcher();
        let opts = ExecuteOptions {
            timeout: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let outcome = d.execute(None, "sleep 30", &opts).unwrap();

        assert_eq!(outcome.status, CommandStatus::Timeout);
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
        assert!(outcome.hint.is_some());
        let id: SessionId = outcome.session_id.as_deref().unwrap().parse().unwrap();
        assert_eq!(d.count(), 1);
        assert!(d.close(&id).unwrap());
    }

    #[test]
    #[cfg(unix)]
    fn test_password_injection_redacts_credential() {
        let d = dispatcher();
        let script = "stty -echo; printf 'Password for test: '; read -r p; stty echo; \
                      if [ \"$p\" = \"secret\" ]; then echo ACCESS-GRANTED; else echo DENIED; fi";
        let opts = ExecuteOptions {
            password: Some("secret".to_string()),
            ..Default::default()
        };
        let outcome = d.execute(None, script, &opts).unwrap();

        assert_eq!(outcome.status, CommandStatus::Completed, "{:?}", outcome);
        assert!(outcome.stdout.contains("ACCESS-GRANTED"), "{:?}", outcome);
        assert!(!outcome.stdout.contains("secret"));
        assert!(!outcome.stdout.to_lowercase().contains("password for"));
    }

    #[test]
    #[cfg(unix)]
    fn test_password_probe_eof_short_circuit() {
        let d = dispatcher();
        // Finishes long before the 5s probe elapses and never prompts.
        let opts = ExecuteOptions {
            password: Some("unused".to_string()),
            ..Default::default()
        };
        let outcome = d.execute(None, "echo quick", &opts).unwrap();

        assert_eq!(outcome.status, CommandStatus::Completed);
        assert_eq!(outcome.stdout.trim(), "quick");
        assert_eq!(d.count(), 0);
    }

    #[test]
    #[cfg(unix)]
    fn test_respond_drives_parked_session_to_completion() {
        let d = dispatcher();
        let outcome = d
            .execute(
                None,
                "printf 'Continue? (y/n) '; read -r a; echo \"answer:$a\"",
                &ExecuteOptions::default(),
            )
            .unwrap();
        assert_eq!(outcome.status, CommandStatus::WaitingForInput);
        let id: SessionId = outcome.session_id.as_deref().unwrap().parse().unwrap();

        let resumed = d.respond(&id, "y", &ExecuteOptions::default()).unwrap();
        assert_eq!(resumed.status, CommandStatus::Completed, "{:?}", resumed);
        assert!(resumed.stdout.contains("answer:y"), "{:?}", resumed);
        assert_eq!(d.count(), 0);
    }

    #[test]
    fn test_respond_unknown_session() {
        let d = dispatcher();
        let result = d.respond(
            &SessionId::from_raw(999_999),
            "y",
            &ExecuteOptions::default(),
        );
        assert!(matches!(
            result,
            Err(crate::error::ShellRelayError::SessionNotFound(_))
        ));
    }

    #[test]
    #[cfg(unix)]
    fn test_working_dir_option() {
        let dir = tempfile::tempdir().unwrap();
        let d = dispatcher();
        let opts = ExecuteOptions {
            working_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let outcome = d.execute(None, "pwd", &opts).unwrap();
        let dir_name = dir
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert!(outcome.stdout.contains(&dir_name), "{:?}", outcome);
    }
}
