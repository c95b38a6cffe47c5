//! Session management module.
//!
//! A session owns exactly one PTY-attached process plus the expectation
//! state for its output stream. Sessions live in a [`SessionRegistry`],
//! which serializes all access so two callers can never interleave reads
//! of the same process stream.

mod context;
mod id;
mod registry;
mod state;

pub use context::{CwdProbe, SessionContext};
pub use id::SessionId;
pub use registry::{Session, SessionKind, SessionRegistry, SessionSummary};
pub use state::SessionPhase;
