//! Output processing and sanitization.
//!
//! Raw PTY output carries escape sequences, credential-prompt lines, and
//! echoed input that must not reach callers. This module strips all of
//! that without losing real content:
//!
//! ```
//! use shell_relay::output::OutputSanitizer;
//!
//! let raw = b"\x1b[31m[sudo] password for alice:\x1b[0m\nreal output\n";
//! let clean = OutputSanitizer::clean(raw, None);
//! assert_eq!(clean, "real output");
//! ```

mod sanitizer;

pub use sanitizer::OutputSanitizer;
