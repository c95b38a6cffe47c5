//! Pattern expectation over a live PTY output stream.
//!
//! There is no message framing on a PTY: completion, prompts, and
//! credential requests all have to be inferred from the byte stream.
//! This module provides:
//! - Tagged, ordered prompt matchers ([`Matcher`], [`PromptKind`])
//! - An incremental engine ([`Expector`]) that waits until one of several
//!   patterns matches, EOF occurs, or a timeout elapses
//!
//! Matching is non-destructive across calls: look-ahead past a match
//! boundary is preserved for the next expectation, so no output is ever
//! swallowed between sequential waits.

mod engine;
mod pattern;

pub use engine::{ExpectMatch, ExpectOutcome, Expector};
pub use pattern::{
    confirmation_prompts, password_prompts, shell_prompts, Matcher, PromptKind,
};
