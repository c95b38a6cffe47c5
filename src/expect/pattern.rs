//! Tagged prompt matchers.
//!
//! Prompt detection is heuristic by nature; keeping the patterns in
//! ordered, tagged tables (rather than inline literals in control flow)
//! means new prompt categories can be added without touching the engine.
//! Registration order is the tie-break: when two patterns match at the
//! same position, the earlier-registered one wins.

use regex::Regex;

use crate::Result;

/// Semantic category of a prompt pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// Credential request (`password for ...`, `[sudo] ...`).
    Password,
    /// Yes/no style confirmation (`(y/n)`, `[Y/n]`).
    Confirmation,
    /// Generic continuation request (`Press`, `Continue`, `Enter`).
    Continuation,
    /// Interactive shell prompt (`$`, `#`, `>` at end of output).
    ShellPrompt,
    /// Caller-supplied pattern.
    Custom,
}

/// A compiled prompt pattern with its semantic tag.
#[derive(Debug, Clone)]
pub struct Matcher {
    regex: Regex,
    kind: PromptKind,
}

impl Matcher {
    /// Compile a new matcher.
    pub fn new(pattern: &str, kind: PromptKind) -> Result<Self> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            kind,
        })
    }

    /// Semantic tag of this matcher.
    pub fn kind(&self) -> PromptKind {
        self.kind
    }

    /// The underlying pattern text.
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Earliest match range in `text`, if any.
    pub(crate) fn find(&self, text: &str) -> Option<(usize, usize)> {
        self.regex.find(text).map(|m| (m.start(), m.end()))
    }
}

/// Compile a builtin table, skipping any entry that fails to compile.
/// The builtin patterns are literals; the unit tests assert none are lost.
fn table(entries: &[(&str, PromptKind)]) -> Vec<Matcher> {
    entries
        .iter()
        .filter_map(|(pattern, kind)| Matcher::new(pattern, *kind).ok())
        .collect()
}

/// Password-style prompts, most specific first.
pub fn password_prompts() -> Vec<Matcher> {
    table(&[
        (r"(?i)\[sudo\] password", PromptKind::Password),
        (r"(?i)password for [^:\r\n]*:", PromptKind::Password),
        (r"(?i)password\s*:", PromptKind::Password),
    ])
}

/// Confirmation and continuation prompts.
///
/// Yes/no styles are registered ahead of the generic continuation words so
/// that a line like `Continue? (y/n)` is tagged as a confirmation.
pub fn confirmation_prompts() -> Vec<Matcher> {
    table(&[
        (r"\[Y/n\]", PromptKind::Confirmation),
        (r"\[y/N\]", PromptKind::Confirmation),
        (r"(?i)\(y/n\)", PromptKind::Confirmation),
        (r"(?i)\by/n\b", PromptKind::Confirmation),
        (r"(?i)\bcontinue\b", PromptKind::Continuation),
        (r"(?i)\bpress\b", PromptKind::Continuation),
        (r"(?i)\bconfirm\b", PromptKind::Continuation),
        (r"(?i)\benter\b", PromptKind::Continuation),
    ])
}

/// Shell prompt at the tail of the buffered output.
pub fn shell_prompts() -> Vec<Matcher> {
    table(&[(r"[$#>]\s*$", PromptKind::ShellPrompt)])
}
