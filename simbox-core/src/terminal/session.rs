//! One remote PTY over one websocket
//!
//! Each session owns a transport task. Callers talk to it through an
//! unbounded outgoing channel; decoded output comes back on a second channel
//! that can be taken exactly once as an [`OutputStream`].

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use simbox_protocol::{ClientFrame, Handshake, ServerFrame, TtyCodec, WindowSize};
use simbox_utils::{Result, SimboxError};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, info, trace, warn};
use url::Url;
use uuid::Uuid;

use crate::config::{TerminalConfig, WorkspaceConfig};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Lifecycle of a session's transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Socket open, no data received yet
    Connecting,
    /// First data frame received; bootstrap sent
    Ready,
    /// Transport gone; further input is dropped
    Closed,
}

/// Per-session connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub subprotocol: String,
    pub size: WindowSize,
    /// Typed into the terminal once it becomes interactive
    pub bootstrap_command: Option<String>,
}

impl SessionOptions {
    pub fn from_config(terminal: &TerminalConfig, workspace: &WorkspaceConfig) -> Self {
        let bootstrap = &workspace.bootstrap_command;
        Self {
            subprotocol: terminal.subprotocol.clone(),
            size: WindowSize::new(terminal.columns, terminal.rows),
            bootstrap_command: (!bootstrap.is_empty()).then(|| bootstrap.clone()),
        }
    }
}

enum Outgoing {
    Frame(ClientFrame),
    Close,
}

/// Summary of a session for listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub state: SessionState,
    pub interactive: bool,
}

/// A live terminal connection
pub struct TerminalSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    state: watch::Receiver<SessionState>,
    interactive: Arc<AtomicBool>,
    output: Mutex<Option<mpsc::UnboundedReceiver<Result<String>>>>,
}

impl TerminalSession {
    /// Open the transport, send the size handshake and start the I/O task
    ///
    /// Connection failures are returned to the caller; anything after that
    /// is reported through the output stream.
    pub async fn connect(url: &Url, options: &SessionOptions) -> Result<Self> {
        let id = Uuid::new_v4();

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| SimboxError::transport(format!("invalid terminal url: {}", e)))?;
        let protocol = HeaderValue::from_str(&options.subprotocol)
            .map_err(|e| SimboxError::transport(format!("invalid subprotocol: {}", e)))?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", protocol);

        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| SimboxError::transport(format!("connect failed: {}", e)))?;
        let (mut sink, stream) = ws.split();

        let handshake = Handshake::new(options.size)
            .to_bytes()
            .map_err(|e| SimboxError::protocol(e.to_string()))?;
        sink.send(Message::binary(handshake))
            .await
            .map_err(|e| SimboxError::transport(format!("handshake failed: {}", e)))?;

        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
        let interactive = Arc::new(AtomicBool::new(false));

        tokio::spawn(transport_task(TransportTask {
            id,
            sink,
            stream,
            outgoing: outgoing_rx,
            output: output_tx,
            state: state_tx,
            interactive: interactive.clone(),
            bootstrap: options.bootstrap_command.clone(),
            codec: TtyCodec::new(),
        }));

        info!(session_id = %id, "Terminal session connected");
        Ok(Self {
            id,
            created_at: Utc::now(),
            outgoing: outgoing_tx,
            state: state_rx,
            interactive,
            output: Mutex::new(Some(output_rx)),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Whether any data has arrived on this session
    pub fn is_interactive(&self) -> bool {
        self.interactive.load(Ordering::Acquire)
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            created_at: self.created_at,
            state: self.state(),
            interactive: self.is_interactive(),
        }
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait until the session is interactive
    ///
    /// Fails with `ConnectionClosed` if the transport ends first.
    pub async fn ready(&self) -> Result<()> {
        let mut state = self.state.clone();
        let _ = state
            .wait_for(|s| *s != SessionState::Connecting)
            .await;
        if self.is_interactive() {
            Ok(())
        } else {
            Err(SimboxError::ConnectionClosed)
        }
    }

    /// Wait until the transport task has finished
    pub async fn closed(&self) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == SessionState::Closed).await;
    }

    /// Take the output stream; only the first call gets it
    pub fn take_output(&self) -> Option<OutputStream> {
        self.output.lock().take().map(|rx| OutputStream { rx })
    }

    /// Send raw bytes as INPUT
    pub fn write_input(&self, data: impl Into<Vec<u8>>) {
        self.send(ClientFrame::Input(data.into()));
    }

    /// Send text as INPUT
    pub fn write_str(&self, text: &str) {
        self.send(ClientFrame::input_text(text));
    }

    pub fn resize(&self, columns: u16, rows: u16) {
        self.send(ClientFrame::Resize(WindowSize::new(columns, rows)));
    }

    pub fn pause(&self) {
        self.send(ClientFrame::Pause);
    }

    pub fn resume(&self) {
        self.send(ClientFrame::Resume);
    }

    /// Send ETX to the foreground process
    pub fn interrupt(&self) {
        self.send(ClientFrame::interrupt());
    }

    /// Ask the transport task to close the socket
    pub fn close(&self) {
        let _ = self.outgoing.send(Outgoing::Close);
    }

    fn send(&self, frame: ClientFrame) {
        if self.state() == SessionState::Closed {
            trace!(session_id = %self.id, "Dropping input for closed session");
            return;
        }
        // The receiver is gone only once the task has exited
        let _ = self.outgoing.send(Outgoing::Frame(frame));
    }
}

impl std::fmt::Debug for TerminalSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("interactive", &self.is_interactive())
            .finish()
    }
}

/// Decoded terminal output, ending when the transport closes
///
/// Transport errors are yielded once, after which the stream ends.
pub struct OutputStream {
    rx: mpsc::UnboundedReceiver<Result<String>>,
}

impl Stream for OutputStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

struct TransportTask {
    id: Uuid,
    sink: WsSink,
    stream: SplitStream<WsStream>,
    outgoing: mpsc::UnboundedReceiver<Outgoing>,
    output: mpsc::UnboundedSender<Result<String>>,
    state: watch::Sender<SessionState>,
    interactive: Arc<AtomicBool>,
    bootstrap: Option<String>,
    codec: TtyCodec,
}

impl TransportTask {
    async fn send_frame(&mut self, frame: ClientFrame) -> Result<()> {
        let mut buf = BytesMut::new();
        self.codec
            .encode(frame, &mut buf)
            .map_err(|e| SimboxError::protocol(e.to_string()))?;
        self.sink
            .send(Message::binary(buf.freeze()))
            .await
            .map_err(|e| SimboxError::transport(e.to_string()))
    }

    /// Latch interactivity on the first data frame and send the bootstrap
    async fn mark_interactive(&mut self) -> Result<()> {
        if self.interactive.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        if let Some(command) = self.bootstrap.take() {
            self.send_frame(ClientFrame::input_text(command)).await?;
        }
        self.state.send_replace(SessionState::Ready);
        debug!(session_id = %self.id, "Terminal session ready");
        Ok(())
    }

    fn handle_binary(&mut self, data: &[u8]) {
        let mut buf = BytesMut::from(data);
        match self.codec.decode(&mut buf) {
            Ok(Some(ServerFrame::Output(text))) => {
                let _ = self.output.send(Ok(text));
            }
            Ok(Some(ServerFrame::SetWindowTitle(title))) => {
                debug!(session_id = %self.id, title = %title, "Window title changed");
            }
            Ok(Some(ServerFrame::SetPreferences(prefs))) => {
                trace!(session_id = %self.id, ?prefs, "Ignoring terminal preferences");
            }
            Ok(None) => {}
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Undecodable terminal frame");
            }
        }
    }

    fn fail(&self, error: SimboxError) {
        warn!(session_id = %self.id, error = %error, "Terminal transport error");
        let _ = self.output.send(Err(error));
    }
}

/// Background task that owns the socket
async fn transport_task(mut task: TransportTask) {
    loop {
        tokio::select! {
            command = task.outgoing.recv() => match command {
                Some(Outgoing::Frame(frame)) => {
                    if let Err(e) = task.send_frame(frame).await {
                        task.fail(e);
                        break;
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = task.sink.send(Message::Close(None)).await;
                    let _ = task.sink.close().await;
                    debug!(session_id = %task.id, "Terminal transport closed locally");
                    break;
                }
            },

            message = task.stream.next() => match message {
                Some(Ok(Message::Binary(data))) => {
                    if let Err(e) = task.mark_interactive().await {
                        task.fail(e);
                        break;
                    }
                    task.handle_binary(&data);
                }
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = task.mark_interactive().await {
                        task.fail(e);
                        break;
                    }
                    let _ = task.output.send(Ok(text.as_str().to_string()));
                }
                Some(Ok(Message::Close(_))) | None => {
                    debug!(session_id = %task.id, "Terminal transport closed by remote");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    task.fail(SimboxError::transport(e.to_string()));
                    break;
                }
            },
        }
    }

    task.state.send_replace(SessionState::Closed);
}
