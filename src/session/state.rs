//! Session phase state machine.

/// Lifecycle phase of a command session.
///
/// One-shot sessions walk `Created -> [AwaitingPassword] ->
/// AwaitingCompletion -> {Completed | WaitingForInput} -> Closed`.
/// Persistent shells park in `WaitingForInput` between commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Session has been created; nothing has been waited on yet.
    #[default]
    Created,
    /// A credential was supplied and the password probe is running.
    AwaitingPassword,
    /// Waiting for the command to finish or to ask for input.
    AwaitingCompletion,
    /// Process exited; output and exit code captured.
    Completed,
    /// A prompt was detected (or a probe timed out); the process is still
    /// running and the session awaits caller input.
    WaitingForInput,
    /// Session has been closed and cannot be reused.
    Closed,
}

impl SessionPhase {
    /// Check if transition to target phase is valid.
    pub fn can_transition_to(&self, target: SessionPhase) -> bool {
        use SessionPhase::*;
        if matches!(target, Closed) {
            // Explicit close is legal from every live phase.
            return !matches!(self, Closed);
        }
        matches!(
            (*self, target),
            (Created, AwaitingPassword)
                | (Created, AwaitingCompletion)
                | (AwaitingPassword, AwaitingCompletion)
                | (AwaitingPassword, Completed)
                | (AwaitingCompletion, Completed)
                | (AwaitingCompletion, WaitingForInput)
                | (WaitingForInput, AwaitingCompletion)
        )
    }

    /// Attempt to transition to a new phase.
    pub fn transition_to(&mut self, target: SessionPhase) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::ShellRelayError::InvalidPhaseTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is a terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Closed)
    }

    /// Check if the session can accept further input from the caller.
    pub fn accepts_input(&self) -> bool {
        matches!(self, SessionPhase::WaitingForInput)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_shot_happy_path() {
        let mut phase = SessionPhase::Created;
        assert!(phase.transition_to(SessionPhase::AwaitingCompletion).is_ok());
        assert!(phase.transition_to(SessionPhase::Completed).is_ok());
        assert!(phase.transition_to(SessionPhase::Closed).is_ok());
    }

    #[test]
    fn test_password_path() {
        let mut phase = SessionPhase::Created;
        assert!(phase.transition_to(SessionPhase::AwaitingPassword).is_ok());
        assert!(phase.transition_to(SessionPhase::AwaitingCompletion).is_ok());
        assert!(phase.transition_to(SessionPhase::WaitingForInput).is_ok());
        // Resume after caller supplies input.
        assert!(phase.transition_to(SessionPhase::AwaitingCompletion).is_ok());
        assert!(phase.transition_to(SessionPhase::Completed).is_ok());
    }

    #[test]
    fn test_password_eof_short_circuit() {
        let mut phase = SessionPhase::AwaitingPassword;
        assert!(phase.transition_to(SessionPhase::Completed).is_ok());
    }

    #[test]
    fn test_close_from_any_live_phase() {
        for phase in [
            SessionPhase::Created,
            SessionPhase::AwaitingPassword,
            SessionPhase::AwaitingCompletion,
            SessionPhase::Completed,
            SessionPhase::WaitingForInput,
        ] {
            let mut p = phase;
            assert!(p.transition_to(SessionPhase::Closed).is_ok(), "{:?}", phase);
        }
    }

    #[test]
    fn test_no_reopen_after_close() {
        let mut phase = SessionPhase::Closed;
        assert!(phase.transition_to(SessionPhase::Created).is_err());
        assert!(phase.transition_to(SessionPhase::Closed).is_err());
        assert!(phase.is_terminal());
    }

    #[test]
    fn test_invalid_skip_transitions() {
        let mut phase = SessionPhase::Created;
        assert!(phase.transition_to(SessionPhase::Completed).is_err());
        assert!(phase.transition_to(SessionPhase::WaitingForInput).is_err());
        assert_eq!(phase, SessionPhase::Created);
    }

    #[test]
    fn test_accepts_input() {
        assert!(SessionPhase::WaitingForInput.accepts_input());
        assert!(!SessionPhase::Created.accepts_input());
        assert!(!SessionPhase::Completed.accepts_input());
    }
}
