//! shell-relay: a stateless request/response command API over real OS
//! processes.
//!
//! Every command runs attached to a pseudo-terminal, so programs behave as
//! they do for a human operator: they prompt for passwords, ask for
//! confirmation, and emit terminal escape codes. shell-relay turns that
//! interactive byte stream back into discrete request/response exchanges:
//!
//! - One-shot commands run to completion, or pause at a detected prompt
//!   and hand back a session id to respond to.
//! - Persistent shells keep state (working directory, environment) across
//!   commands; completion is detected by the prompt returning.
//! - A singleton shared terminal stays rooted at a fixed directory.
//!
//! Prompt detection is heuristic pattern-matching over unstructured
//! output. It is deliberately conservative and every wait is bounded by a
//! timeout, so a wrong guess costs latency, never a hang.
//!
//! # Quick start
//!
//! ```no_run
//! use shell_relay::{ExecuteOptions, Relay};
//!
//! # fn main() -> shell_relay::Result<()> {
//! let relay = Relay::with_defaults();
//! let outcome = relay.execute(None, "echo hello", &ExecuteOptions::default())?;
//! assert_eq!(outcome.stdout, "hello");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod expect;
pub mod logging;
pub mod output;
pub mod pty;
pub mod session;

pub use config::Config;
pub use dispatch::{
    CommandOutcome, CommandStatus, ExecuteOptions, Relay, TerminalOptions,
};
pub use error::{Result, ShellRelayError};
pub use session::{SessionId, SessionSummary};
