//! Incremental expectation engine.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::pattern::{Matcher, PromptKind};
use crate::pty::{ProcessHandle, ReadEvent};

/// How long to wait for the exit code once EOF is observed.
const EXIT_CODE_GRACE: Duration = Duration::from_secs(2);

/// A successful pattern match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectMatch {
    /// Index of the matched pattern in the registered list.
    pub index: usize,
    /// Semantic tag of the matched pattern.
    pub kind: PromptKind,
    /// Text read since the last match, up to the match start.
    pub before: String,
    /// The raw matched text.
    pub matched: String,
}

/// Outcome of one expectation wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectOutcome {
    /// One of the registered patterns matched.
    Match(ExpectMatch),
    /// The process closed its output stream.
    Eof {
        /// All text read since the last match.
        before: String,
        /// Exit code, if the process reaped within the grace period.
        exit_code: Option<i32>,
    },
    /// The timeout elapsed with no pattern match and no EOF.
    Timeout {
        /// All text read since the last match.
        before: String,
    },
}

/// Incremental multi-pattern matcher over a PTY output stream.
///
/// The expector owns the unmatched look-ahead between calls. After a match,
/// any bytes past the match boundary stay buffered for the next call, so
/// sequential expectations never lose output. On EOF or timeout the whole
/// buffer is handed back to the caller instead.
#[derive(Debug, Default)]
pub struct Expector {
    /// Decoded, not-yet-matched text.
    text: String,
    /// Undecoded tail of a UTF-8 sequence split across reads.
    partial: Vec<u8>,
}

impl Expector {
    /// Create a new expector with an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw stream bytes, decoding as much UTF-8 as possible.
    ///
    /// An incomplete multi-byte sequence at the end of `bytes` is held back
    /// until the next ingest; invalid bytes become replacement characters.
    pub fn ingest(&mut self, bytes: &[u8]) {
        self.partial.extend_from_slice(bytes);
        loop {
            match std::str::from_utf8(&self.partial) {
                Ok(s) => {
                    self.text.push_str(s);
                    self.partial.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.text
                        .push_str(&String::from_utf8_lossy(&self.partial[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            self.partial.drain(..valid + len);
                        }
                        None => {
                            // Incomplete sequence; wait for more bytes.
                            self.partial.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Currently buffered (unmatched) text.
    pub fn pending(&self) -> &str {
        &self.text
    }

    /// Take the entire buffer, including any undecoded tail.
    pub fn take_pending(&mut self) -> String {
        if !self.partial.is_empty() {
            let tail = std::mem::take(&mut self.partial);
            self.text.push_str(&String::from_utf8_lossy(&tail));
        }
        std::mem::take(&mut self.text)
    }

    /// Scan the buffer against the patterns and consume up to the match.
    ///
    /// Earliest match position wins; ties go to the earliest-registered
    /// pattern. Look-ahead past the match boundary stays buffered.
    pub fn scan(&mut self, patterns: &[Matcher]) -> Option<ExpectMatch> {
        let mut best: Option<(usize, usize, usize)> = None;
        for (index, matcher) in patterns.iter().enumerate() {
            if let Some((start, end)) = matcher.find(&self.text) {
                // Strict < keeps the earliest-registered pattern on ties.
                if best.map_or(true, |(_, s, _)| start < s) {
                    best = Some((index, start, end));
                }
            }
        }

        let (index, start, end) = best?;
        let matched = self.text[start..end].to_string();
        let before = self.text[..start].to_string();
        self.text.drain(..end);
        trace!(index, ?matched, "pattern matched");
        Some(ExpectMatch {
            index,
            kind: patterns[index].kind(),
            before,
            matched,
        })
    }

    /// Wait until one of `patterns` matches, EOF occurs, or `timeout`
    /// elapses, consuming stream bytes from `handle` as they arrive.
    pub fn expect(
        &mut self,
        handle: &mut ProcessHandle,
        patterns: &[Matcher],
        timeout: Duration,
    ) -> ExpectOutcome {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(m) = self.scan(patterns) {
                return ExpectOutcome::Match(m);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(?timeout, "expectation timed out");
                return ExpectOutcome::Timeout {
                    before: self.take_pending(),
                };
            }

            match handle.read_chunk(remaining) {
                ReadEvent::Data(bytes) => self.ingest(&bytes),
                ReadEvent::Timeout => {
                    debug!(?timeout, "expectation timed out");
                    return ExpectOutcome::Timeout {
                        before: self.take_pending(),
                    };
                }
                ReadEvent::Eof => {
                    // Flush the tail and give buffered text one last scan
                    // before reporting EOF.
                    if !self.partial.is_empty() {
                        let tail = std::mem::take(&mut self.partial);
                        self.text.push_str(&String::from_utf8_lossy(&tail));
                    }
                    if let Some(m) = self.scan(patterns) {
                        return ExpectOutcome::Match(m);
                    }
                    let exit_code = handle.wait_exit(EXIT_CODE_GRACE);
                    debug!(?exit_code, "expectation hit EOF");
                    return ExpectOutcome::Eof {
                        before: self.take_pending(),
                        exit_code,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expect::pattern::{confirmation_prompts, Matcher, PromptKind};
    use crate::pty::SpawnOptions;

    fn custom(pattern: &str) -> Matcher {
        Matcher::new(pattern, PromptKind::Custom).unwrap()
    }

    #[test]
    fn test_scan_no_match() {
        let mut exp = Expector::new();
        exp.ingest(b"plain output");
        assert!(exp.scan(&[custom("missing")]).is_none());
        assert_eq!(exp.pending(), "plain output");
    }

    #[test]
    fn test_scan_consumes_through_match() {
        let mut exp = Expector::new();
        exp.ingest(b"before PROMPT after");
        let m = exp.scan(&[custom("PROMPT")]).unwrap();
        assert_eq!(m.before, "before ");
        assert_eq!(m.matched, "PROMPT");
        // Look-ahead past the match boundary is preserved.
        assert_eq!(exp.pending(), " after");
    }

    #[test]
    fn test_earliest_position_wins() {
        let mut exp = Expector::new();
        exp.ingest(b"xx LATER yy EARLY");
        // "LATER" appears earlier in the stream even though "EARLY" is
        // registered first.
        let m = exp
            .scan(&[custom("EARLY"), custom("LATER")])
            .unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(m.matched, "LATER");
    }

    #[test]
    fn test_registration_order_breaks_position_ties() {
        let mut exp = Expector::new();
        exp.ingest(b"Continue? (y/n)");
        // Both a y/n pattern and "continue" match; different positions, so
        // the earliest position ("Continue" at 0) wins here.
        let m = exp.scan(&confirmation_prompts()).unwrap();
        assert_eq!(m.kind, PromptKind::Continuation);

        // Same start position: earliest-registered wins.
        let mut exp = Expector::new();
        exp.ingest(b"abc");
        let m = exp.scan(&[custom("abc"), custom("ab")]).unwrap();
        assert_eq!(m.index, 0);
        assert_eq!(m.matched, "abc");
    }

    #[test]
    fn test_incremental_match_across_ingests() {
        let mut exp = Expector::new();
        exp.ingest(b"pass");
        assert!(exp.scan(&[custom("password:")]).is_none());
        exp.ingest(b"word:");
        let m = exp.scan(&[custom("password:")]).unwrap();
        assert_eq!(m.matched, "password:");
    }

    #[test]
    fn test_utf8_split_across_reads() {
        let mut exp = Expector::new();
        let bytes = "héllo".as_bytes();
        // Split inside the two-byte é sequence.
        exp.ingest(&bytes[..2]);
        exp.ingest(&bytes[2..]);
        assert_eq!(exp.pending(), "héllo");
    }

    #[test]
    fn test_take_pending_drains_everything() {
        let mut exp = Expector::new();
        exp.ingest(b"some text");
        assert_eq!(exp.take_pending(), "some text");
        assert_eq!(exp.pending(), "");
    }

    #[test]
    fn test_sequential_expectations_lose_nothing() {
        let mut exp = Expector::new();
        exp.ingest(b"first STOP second STOP third");
        let stop = [custom("STOP")];
        let m1 = exp.scan(&stop).unwrap();
        let m2 = exp.scan(&stop).unwrap();
        assert_eq!(m1.before, "first ");
        assert_eq!(m2.before, " second ");
        assert_eq!(exp.pending(), " third");
    }

    #[test]
    #[cfg(unix)]
    fn test_expect_match_on_live_process() {
        let mut handle =
            ProcessHandle::spawn(SpawnOptions::shell_command("printf 'ready> '; sleep 30"))
                .unwrap();
        let mut exp = Expector::new();
        let outcome = exp.expect(&mut handle, &[custom("ready>")], Duration::from_secs(10));
        match outcome {
            ExpectOutcome::Match(m) => assert_eq!(m.matched, "ready>"),
            other => panic!("expected match, got {:?}", other),
        }
        handle.terminate(true);
    }

    #[test]
    #[cfg(unix)]
    fn test_expect_eof_with_exit_code() {
        let mut handle =
            ProcessHandle::spawn(SpawnOptions::shell_command("echo done; exit 4")).unwrap();
        let mut exp = Expector::new();
        let outcome = exp.expect(&mut handle, &[custom("never-matches")], Duration::from_secs(10));
        match outcome {
            ExpectOutcome::Eof { before, exit_code } => {
                assert!(before.contains("done"));
                assert_eq!(exit_code, Some(4));
            }
            other => panic!("expected EOF, got {:?}", other),
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_expect_timeout_returns_partial_output() {
        let mut handle =
            ProcessHandle::spawn(SpawnOptions::shell_command("printf 'partial'; sleep 30"))
                .unwrap();
        let mut exp = Expector::new();
        let start = Instant::now();
        let outcome = exp.expect(
            &mut handle,
            &[custom("never-matches")],
            Duration::from_millis(500),
        );
        assert!(start.elapsed() < Duration::from_secs(5));
        match outcome {
            ExpectOutcome::Timeout { before } => assert!(before.contains("partial")),
            other => panic!("expected timeout, got {:?}", other),
        }
        handle.terminate(true);
    }
}
