//! PTY (Pseudo-Terminal) abstraction layer.
//!
//! This module provides a platform-independent interface for spawning
//! child processes attached to a pseudo-terminal and driving them through
//! timeout-bounded reads. It supports both Unix PTY and Windows ConPTY.

mod process;

pub use process::{default_shell, ProcessHandle, ReadEvent, SpawnOptions};

/// Size of a PTY in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtySize {
    /// Number of rows (height).
    pub rows: u16,
    /// Number of columns (width).
    pub cols: u16,
}

impl PtySize {
    /// Create a new PtySize with the given dimensions.
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }
}

impl Default for PtySize {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}
