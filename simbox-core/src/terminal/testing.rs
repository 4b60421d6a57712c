//! Local stand-in for the remote PTY host

use std::time::Duration;

use bytes::BytesMut;
use futures::{Sink, SinkExt, StreamExt};
use simbox_protocol::{ClientFrame, PtyServerCodec, ServerFrame};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::codec::{Decoder, Encoder};
use url::Url;

/// What the fake host does after the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PtyBehavior {
    /// Greet, echo input and run `echo`/marker commands
    Shell,
    /// Greet, read one frame, then close
    CloseAfterGreeting,
    /// Close right after the handshake
    CloseImmediately,
    /// Accept the handshake, then never write anything
    Silent,
}

/// Observations made by the fake host
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PtyEvent {
    Connected {
        subprotocol: Option<String>,
        authorization: Option<String>,
    },
    Handshake(serde_json::Value),
    Frame(ClientFrame),
    Closed,
}

pub(crate) struct FakePty {
    pub url: Url,
    events: mpsc::UnboundedReceiver<PtyEvent>,
    _accept: JoinHandle<()>,
}

impl FakePty {
    pub async fn start(behavior: PtyBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (events_tx, events) = mpsc::unbounded_channel();

        let accept = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, behavior, events_tx.clone()));
            }
        });

        Self {
            url: Url::parse(&format!("ws://{}/ws?Authorization=test-token", addr)).unwrap(),
            events,
            _accept: accept,
        }
    }

    /// Host part of the url, as the domain endpoint would hand it out
    pub fn host(&self) -> String {
        format!(
            "{}:{}",
            self.url.host_str().unwrap(),
            self.url.port().unwrap()
        )
    }

    pub async fn next_event(&mut self) -> PtyEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("timed out waiting for pty event")
            .expect("pty event channel closed")
    }

    /// Collect events up to and including the next `Closed`
    pub async fn drain_events(&mut self) -> Vec<PtyEvent> {
        let mut seen = Vec::new();
        loop {
            let event = self.next_event().await;
            let done = event == PtyEvent::Closed;
            seen.push(event);
            if done {
                return seen;
            }
        }
    }
}

async fn serve(
    stream: tokio::net::TcpStream,
    behavior: PtyBehavior,
    events: mpsc::UnboundedSender<PtyEvent>,
) {
    let mut connected = None;
    let callback = |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
        let subprotocol = req
            .headers()
            .get("Sec-WebSocket-Protocol")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let authorization = req.uri().query().and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == "Authorization")
                .map(|(_, v)| v.into_owned())
        });
        if let Some(protocol) = &subprotocol {
            if let Ok(value) = HeaderValue::from_str(protocol) {
                resp.headers_mut().insert("Sec-WebSocket-Protocol", value);
            }
        }
        connected = Some(PtyEvent::Connected {
            subprotocol,
            authorization,
        });
        Ok(resp)
    };

    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };
    if let Some(event) = connected {
        let _ = events.send(event);
    }

    let mut codec = PtyServerCodec::new();

    // Handshake travels outside the tag framing
    if let Some(Ok(Message::Binary(data))) = ws.next().await {
        let value = serde_json::from_slice(&data).unwrap_or(serde_json::Value::Null);
        let _ = events.send(PtyEvent::Handshake(value));
    }

    if behavior == PtyBehavior::CloseImmediately {
        let _ = ws.close(None).await;
        let _ = events.send(PtyEvent::Closed);
        return;
    }

    if behavior == PtyBehavior::Silent {
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
        let _ = events.send(PtyEvent::Closed);
        return;
    }

    send_output(&mut ws, &mut codec, "$ ").await;

    while let Some(Ok(message)) = ws.next().await {
        let data = match message {
            Message::Binary(data) => data,
            Message::Close(_) => break,
            _ => continue,
        };
        let Ok(Some(frame)) = codec.decode(&mut BytesMut::from(&data[..])) else {
            continue;
        };
        let _ = events.send(PtyEvent::Frame(frame.clone()));

        if behavior == PtyBehavior::CloseAfterGreeting {
            let _ = ws.close(None).await;
            break;
        }

        if let ClientFrame::Input(bytes) = frame {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            for line in text.split_inclusive('\n') {
                run_line(&mut ws, &mut codec, line).await;
            }
        }
    }

    let _ = events.send(PtyEvent::Closed);
}

/// Echo a typed line and produce what a shell would print for it
async fn run_line<S>(ws: &mut S, codec: &mut PtyServerCodec, line: &str)
where
    S: Sink<Message> + Unpin,
{
    let typed = line.trim_end_matches('\n');
    send_output(ws, codec, &format!("{}\r\n", typed)).await;
    if !line.ends_with('\n') {
        return;
    }

    let (command, marker) = match typed.split_once("; echo \"") {
        Some((command, rest)) => (command, Some(rest.trim_end_matches('"').replace("\"\"", ""))),
        None => (typed, None),
    };

    if command == "hang" {
        return;
    }
    if let Some(arg) = command.strip_prefix("echo ") {
        send_output(ws, codec, &format!("{}\r\n", arg)).await;
    }
    if let Some(marker) = marker {
        send_output(ws, codec, &format!("{}\r\n", marker)).await;
    }
}

async fn send_output<S>(ws: &mut S, codec: &mut PtyServerCodec, text: &str)
where
    S: Sink<Message> + Unpin,
{
    let mut buf = BytesMut::new();
    if codec.encode(ServerFrame::Output(text.into()), &mut buf).is_ok() {
        let _ = ws.send(Message::binary(buf.freeze())).await;
    }
}
