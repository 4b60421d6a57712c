//! simbox-protocol: Wire definitions shared by the simbox crates
//!
//! This crate defines the tag-framed terminal protocol spoken over the
//! remote PTY websocket, and the JSON bodies exchanged with the object
//! store and domain HTTP endpoints.

pub mod codec;
pub mod messages;
pub mod types;

// Re-export main types at crate root
pub use codec::{CodecError, PtyServerCodec, TtyCodec};
pub use messages::{command, ClientFrame, Handshake, ServerFrame, WindowSize};
pub use types::{
    ApiResponse, DomainsData, DomainsResponse, TreeResponse, UploadRequest, GITKEEP_FILE,
};

/// WebSocket sub-protocol identifier requested when opening a terminal
pub const TTY_SUBPROTOCOL: &str = "tty";
