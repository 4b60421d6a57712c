//! Terminal frame types
//!
//! Every application message on a terminal transport is a frame whose first
//! byte is a one-character command tag followed by the payload. Frames are
//! length-implicit: the transport delivers each one as a whole message.

use serde::{Deserialize, Serialize};

/// Command tags, one ASCII byte each
///
/// The two directions reuse the same characters with different meanings.
pub mod command {
    // server -> client
    pub const OUTPUT: u8 = b'0';
    pub const SET_WINDOW_TITLE: u8 = b'1';
    pub const SET_PREFERENCES: u8 = b'2';

    // client -> server
    pub const INPUT: u8 = b'0';
    pub const RESIZE_TERMINAL: u8 = b'1';
    pub const PAUSE: u8 = b'2';
    pub const RESUME: u8 = b'3';
}

/// ETX, delivered as INPUT to interrupt the foreground process
pub const INTERRUPT_BYTE: u8 = 0x03;

/// Terminal dimensions carried by RESIZE_TERMINAL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub columns: u16,
    pub rows: u16,
}

impl WindowSize {
    pub fn new(columns: u16, rows: u16) -> Self {
        Self { columns, rows }
    }
}

/// Frames sent from the client to the remote PTY
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Raw keystroke or command bytes
    Input(Vec<u8>),
    /// Change the PTY window size
    Resize(WindowSize),
    /// Ask the remote to stop sending output (flow control)
    Pause,
    /// Resume output after a pause
    Resume,
}

impl ClientFrame {
    /// INPUT frame carrying UTF-8 text
    pub fn input_text(text: impl AsRef<str>) -> Self {
        Self::Input(text.as_ref().as_bytes().to_vec())
    }

    /// INPUT frame carrying a single ETX byte
    pub fn interrupt() -> Self {
        Self::Input(vec![INTERRUPT_BYTE])
    }

    /// Command tag for this frame
    pub fn tag(&self) -> u8 {
        match self {
            Self::Input(_) => command::INPUT,
            Self::Resize(_) => command::RESIZE_TERMINAL,
            Self::Pause => command::PAUSE,
            Self::Resume => command::RESUME,
        }
    }
}

/// Frames sent from the remote PTY to the client
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// Terminal output to display
    Output(String),
    /// New window title
    SetWindowTitle(String),
    /// Advisory client preferences
    SetPreferences(serde_json::Value),
}

impl ServerFrame {
    /// Command tag for this frame
    pub fn tag(&self) -> u8 {
        match self {
            Self::Output(_) => command::OUTPUT,
            Self::SetWindowTitle(_) => command::SET_WINDOW_TITLE,
            Self::SetPreferences(_) => command::SET_PREFERENCES,
        }
    }
}

/// Initial control message sent once after the transport opens
///
/// It travels outside the tag framing and declares the terminal size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    #[serde(rename = "AuthToken")]
    pub auth_token: String,
    pub columns: u16,
    pub rows: u16,
}

impl Handshake {
    pub fn new(size: WindowSize) -> Self {
        Self {
            auth_token: String::new(),
            columns: size.columns,
            rows: size.rows,
        }
    }

    /// Serialize to the JSON bytes sent on the wire
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
