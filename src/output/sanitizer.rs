//! Output sanitization: ANSI stripping and credential redaction.

use vte::{Params, Parser, Perform};

/// Substrings (lowercase) that mark a line as a credential prompt.
/// Matching lines are dropped wholesale from cleaned output.
const CREDENTIAL_MARKERS: [&str; 3] = ["password for", "[sudo]", "sorry, try again"];

/// Output sanitizer using a VTE parser for escape-sequence removal.
///
/// All functions are pure and never fail; on pathological input they
/// degrade to returning the text as-is rather than erroring.
pub struct OutputSanitizer;

impl OutputSanitizer {
    /// Strip ANSI escape codes from raw bytes.
    ///
    /// Returns clean UTF-8 text with all control sequences removed.
    pub fn strip_ansi(input: &[u8]) -> String {
        let mut extractor = PlainTextExtractor::new();
        let mut parser = Parser::new();

        parser.advance(&mut extractor, input);

        extractor.into_string()
    }

    /// Strip ANSI codes from a string.
    pub fn strip_ansi_str(input: &str) -> String {
        Self::strip_ansi(input.as_bytes())
    }

    /// Fully clean raw process output.
    ///
    /// 1. Strips ANSI/VT100 escape sequences.
    /// 2. Drops lines containing a credential marker (case-insensitive).
    /// 3. If `echoed_command` is given and the first line reproduces it,
    ///    drops that echo line.
    /// 4. Trims leading/trailing fully-blank lines; internal blank lines
    ///    are preserved.
    pub fn clean(raw: &[u8], echoed_command: Option<&str>) -> String {
        let text = Self::strip_ansi(raw);
        Self::clean_lines(&text, echoed_command)
    }

    /// [`clean`](Self::clean) for text that is already decoded.
    pub fn clean_str(text: &str, echoed_command: Option<&str>) -> String {
        let stripped = Self::strip_ansi_str(text);
        Self::clean_lines(&stripped, echoed_command)
    }

    fn clean_lines(text: &str, echoed_command: Option<&str>) -> String {
        let mut lines: Vec<&str> = text
            .split('\n')
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !Self::is_credential_line(line))
            .collect();

        if let Some(cmd) = echoed_command {
            if lines.first().is_some_and(|first| first.trim() == cmd.trim()) {
                lines.remove(0);
            }
        }

        while lines.first().is_some_and(|l| l.trim().is_empty()) {
            lines.remove(0);
        }
        while lines.last().is_some_and(|l| l.trim().is_empty()) {
            lines.pop();
        }

        lines.join("\n")
    }

    fn is_credential_line(line: &str) -> bool {
        let lower = line.to_lowercase();
        CREDENTIAL_MARKERS
            .iter()
            .any(|marker| lower.contains(marker))
    }
}

/// VTE performer that extracts plain text.
struct PlainTextExtractor {
    output: Vec<u8>,
}

impl PlainTextExtractor {
    fn new() -> Self {
        Self { output: Vec::new() }
    }

    fn into_string(self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl Perform for PlainTextExtractor {
    fn print(&mut self, c: char) {
        let mut buf = [0u8; 4];
        let encoded = c.encode_utf8(&mut buf);
        self.output.extend_from_slice(encoded.as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        // Keep newline, carriage return, tab; drop other control bytes.
        match byte {
            0x0A | 0x0D | 0x09 => self.output.push(byte),
            _ => {}
        }
    }

    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}

    fn put(&mut self, _byte: u8) {}

    fn unhook(&mut self) {}

    fn osc_dispatch(&mut self, _params: &[&[u8]], _bell_terminated: bool) {}

    fn csi_dispatch(
        &mut self,
        _params: &Params,
        _intermediates: &[u8],
        _ignore: bool,
        _action: char,
    ) {
    }

    fn esc_dispatch(&mut self, _intermediates: &[u8], _ignore: bool, _byte: u8) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text() {
        let output = OutputSanitizer::strip_ansi(b"hello world");
        assert_eq!(output, "hello world");
    }

    #[test]
    fn test_strip_color_codes() {
        let output = OutputSanitizer::strip_ansi(b"\x1b[31mred\x1b[0m");
        assert_eq!(output, "red");
    }

    #[test]
    fn test_preserve_newlines_and_tabs() {
        let output = OutputSanitizer::strip_ansi(b"line1\nline2\tend");
        assert_eq!(output, "line1\nline2\tend");
    }

    #[test]
    fn test_strip_cursor_movement() {
        let output = OutputSanitizer::strip_ansi(b"\x1b[2J\x1b[Hcontent");
        assert_eq!(output, "content");
    }

    #[test]
    fn test_osc_title() {
        let output = OutputSanitizer::strip_ansi(b"\x1b]0;Window Title\x07actual content");
        assert_eq!(output, "actual content");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(OutputSanitizer::strip_ansi(b""), "");
    }

    #[test]
    fn test_clean_drops_sudo_prompt_line() {
        let raw = b"\x1b[1m[sudo] password for user:\x1b[0m\nuid=0(root)\n";
        let clean = OutputSanitizer::clean(raw, None);
        assert_eq!(clean, "uid=0(root)");
        assert!(!clean.contains('\x1b'));
    }

    #[test]
    fn test_clean_drops_all_credential_markers() {
        let raw = "Password for alice:\nSorry, try again.\n[sudo] password:\nreal\n";
        let clean = OutputSanitizer::clean_str(raw, None);
        assert_eq!(clean, "real");
    }

    #[test]
    fn test_clean_preserves_internal_blank_lines() {
        let raw = "first\n\nsecond\n";
        let clean = OutputSanitizer::clean_str(raw, None);
        assert_eq!(clean, "first\n\nsecond");
    }

    #[test]
    fn test_clean_trims_edge_blank_lines_only() {
        let raw = "\n\n  \ncontent\n\nmore\n   \n\n";
        let clean = OutputSanitizer::clean_str(raw, None);
        assert_eq!(clean, "content\n\nmore");
    }

    #[test]
    fn test_clean_suppresses_command_echo() {
        let raw = "ls -la\r\ntotal 4\nfile.txt\n";
        let clean = OutputSanitizer::clean_str(raw, Some("ls -la"));
        assert_eq!(clean, "total 4\nfile.txt");
    }

    #[test]
    fn test_clean_keeps_non_echo_first_line() {
        let raw = "total 4\nfile.txt\n";
        let clean = OutputSanitizer::clean_str(raw, Some("ls -la"));
        assert_eq!(clean, "total 4\nfile.txt");
    }

    #[test]
    fn test_clean_handles_carriage_returns() {
        let raw = "line1\r\nline2\r\n";
        let clean = OutputSanitizer::clean_str(raw, None);
        assert_eq!(clean, "line1\nline2");
    }

    #[test]
    fn test_clean_credential_marker_case_insensitive() {
        let raw = "PASSWORD FOR root:\noutput\n";
        let clean = OutputSanitizer::clean_str(raw, None);
        assert_eq!(clean, "output");
    }
}
