//! Terminal output cleanup and error spotting

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// CSI sequences (colors, cursor movement, private modes)
    static ref CSI: Regex = Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]").unwrap();
    /// OSC sequences terminated by BEL or ST
    static ref OSC: Regex = Regex::new(r"\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)").unwrap();
    /// Remaining two-byte escapes
    static ref ESC: Regex = Regex::new(r"\x1b[@-Z\\-_]").unwrap();
    /// Control characters other than newline and tab
    static ref CONTROL: Regex = Regex::new(r"[\x00-\x08\x0b-\x1f\x7f]").unwrap();
    /// Runs of blank lines
    static ref BLANK_LINES: Regex = Regex::new(r"\n[ \t]*(?:\n[ \t]*)+").unwrap();
    static ref ERROR_KEYWORD: Regex = Regex::new(r"(?i)error|exception|failed|failure").unwrap();
}

/// Strip escape sequences and control characters, collapse blank lines
pub fn clean_terminal_output(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    let text = OSC.replace_all(&text, "");
    let text = CSI.replace_all(&text, "");
    let text = ESC.replace_all(&text, "");
    let text = CONTROL.replace_all(&text, "");
    let text = BLANK_LINES.replace_all(&text, "\n");
    text.trim().to_string()
}

/// Whether cleaned output mentions a failure
pub fn contains_error(text: &str) -> bool {
    ERROR_KEYWORD.is_match(text)
}

/// Accumulates one command's output and reports it once it looks like an error
#[derive(Debug, Default)]
pub struct ShellErrorWatcher {
    buffer: String,
    reported: bool,
}

impl ShellErrorWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add output; returns the cleaned buffer the first time an error shows up
    pub fn push(&mut self, chunk: &str) -> Option<String> {
        self.buffer.push_str(chunk);
        if self.reported {
            return None;
        }

        let cleaned = clean_terminal_output(&self.buffer);
        if contains_error(&cleaned) {
            self.reported = true;
            Some(cleaned)
        } else {
            None
        }
    }

    /// Forget the current command's output
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.reported = false;
    }
}
