//! Remote terminal sessions
//!
//! Each [`TerminalSession`] drives one websocket to the remote PTY host.
//! The [`TerminalRegistry`] tracks live sessions and runs headless commands.

mod exec;
mod registry;
mod session;
mod shell;

#[cfg(test)]
pub(crate) mod testing;

pub use exec::{command_line, extract_output, CommandOutput, Marker};
pub use registry::TerminalRegistry;
pub use session::{OutputStream, SessionInfo, SessionOptions, SessionState, TerminalSession};
pub use shell::{clean_terminal_output, contains_error, ShellErrorWatcher};
