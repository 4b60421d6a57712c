//! Marker-terminated command execution over a terminal stream
//!
//! A command is typed with a trailing `echo` of a random marker. Output is
//! collected until the marker shows up, then the echoed command line and the
//! marker are cut away.

use futures::StreamExt;
use simbox_utils::{Result, SimboxError};

use super::session::OutputStream;

const MARKER_PREFIX: &str = "__CMD_COMPLETE_";
const MARKER_SUFFIX: &str = "__";
const MARKER_ID_LEN: usize = 12;

/// Result of a headless command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub output: String,
}

impl CommandOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            output: output.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            output: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// `command` followed by its space-joined arguments
pub fn command_line(command: &str, args: &[String]) -> String {
    std::iter::once(command)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Completion marker around a fresh random id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    id: String,
}

impl Marker {
    pub fn generate() -> Self {
        let id = std::iter::repeat_with(fastrand::alphanumeric)
            .take(MARKER_ID_LEN)
            .collect();
        Self { id }
    }

    /// The text the shell prints when the command finishes
    pub fn text(&self) -> String {
        format!("{}{}{}", MARKER_PREFIX, self.id, MARKER_SUFFIX)
    }

    /// Typed line: the command, then an echo of the marker
    ///
    /// The marker is split by an empty quoted string so the terminal's echo
    /// of the typed line never contains it verbatim.
    pub fn typed_line(&self, command_line: &str) -> String {
        format!(
            "{}; echo \"{}\"\"{}{}\"",
            command_line, MARKER_PREFIX, self.id, MARKER_SUFFIX
        )
    }
}

/// Accumulate output until `marker` appears
pub(crate) async fn collect_until(output: &mut OutputStream, marker: &str) -> Result<String> {
    let mut buffer = String::new();
    while let Some(chunk) = output.next().await {
        buffer.push_str(&chunk?);
        if buffer.contains(marker) {
            return Ok(buffer);
        }
    }
    Err(SimboxError::ConnectionClosed)
}

/// Text printed by the command itself
///
/// Everything from the marker on is dropped, as is everything up to and
/// including the echoed command line.
pub fn extract_output(raw: &str, typed_line: &str, command_line: &str, marker: &str) -> String {
    let before = raw.find(marker).map_or(raw, |at| &raw[..at]);

    let body = match before.rfind(typed_line) {
        Some(at) => &before[at + typed_line.len()..],
        None => match before.rfind(command_line) {
            Some(at) if !command_line.is_empty() => &before[at + command_line.len()..],
            _ => before,
        },
    };

    body.replace("\r\n", "\n").trim().to_string()
}
