//! Tag-framed terminal codec
//!
//! The websocket already delimits messages, so a frame has no length
//! prefix: decoding consumes everything in the buffer as one frame.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::messages::{command, ClientFrame, ServerFrame, WindowSize};

/// Maximum frame size (16 MB)
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Terminal codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON payload error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown command tag: {0:#04x}")]
    UnknownCommand(u8),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}

/// Codec for ClientFrame (encoding) and ServerFrame (decoding)
/// Used by the terminal session
pub struct TtyCodec;

impl TtyCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TtyCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for TtyCodec {
    type Item = ServerFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((tag, payload)) = take_frame(src) else {
            return Ok(None);
        };

        let frame = match tag {
            command::OUTPUT => ServerFrame::Output(String::from_utf8_lossy(&payload).into_owned()),
            command::SET_WINDOW_TITLE => {
                ServerFrame::SetWindowTitle(String::from_utf8_lossy(&payload).into_owned())
            }
            command::SET_PREFERENCES => ServerFrame::SetPreferences(serde_json::from_slice(&payload)?),
            other => return Err(CodecError::UnknownCommand(other)),
        };
        Ok(Some(frame))
    }
}

impl Encoder<ClientFrame> for TtyCodec {
    type Error = CodecError;

    fn encode(&mut self, item: ClientFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let tag = item.tag();
        match item {
            ClientFrame::Input(data) => put_frame(tag, &data, dst),
            ClientFrame::Resize(size) => put_frame(tag, &serde_json::to_vec(&size)?, dst),
            ClientFrame::Pause | ClientFrame::Resume => put_frame(tag, &[], dst),
        }
    }
}

/// Codec for ServerFrame (encoding) and ClientFrame (decoding)
/// Used by the remote side, and by local PTY hosts in tests
pub struct PtyServerCodec;

impl PtyServerCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PtyServerCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for PtyServerCodec {
    type Item = ClientFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some((tag, payload)) = take_frame(src) else {
            return Ok(None);
        };

        let frame = match tag {
            command::INPUT => ClientFrame::Input(payload.to_vec()),
            command::RESIZE_TERMINAL => {
                let size: WindowSize = serde_json::from_slice(&payload)?;
                ClientFrame::Resize(size)
            }
            command::PAUSE => ClientFrame::Pause,
            command::RESUME => ClientFrame::Resume,
            other => return Err(CodecError::UnknownCommand(other)),
        };
        Ok(Some(frame))
    }
}

impl Encoder<ServerFrame> for PtyServerCodec {
    type Error = CodecError;

    fn encode(&mut self, item: ServerFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let tag = item.tag();
        match item {
            ServerFrame::Output(text) | ServerFrame::SetWindowTitle(text) => {
                put_frame(tag, text.as_bytes(), dst)
            }
            ServerFrame::SetPreferences(value) => put_frame(tag, &serde_json::to_vec(&value)?, dst),
        }
    }
}

/// Split the whole buffer into a tag byte and its payload
fn take_frame(src: &mut BytesMut) -> Option<(u8, BytesMut)> {
    if src.is_empty() {
        return None;
    }

    let mut frame = src.split();
    let payload = frame.split_off(1);
    Some((frame[0], payload))
}

/// Write a tag byte followed by the payload
fn put_frame(tag: u8, payload: &[u8], dst: &mut BytesMut) -> Result<(), CodecError> {
    if payload.len() + 1 > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: payload.len() + 1,
            max: MAX_FRAME_SIZE,
        });
    }

    dst.reserve(1 + payload.len());
    dst.put_u8(tag);
    dst.put_slice(payload);
    Ok(())
}
