//! Interactive remote shell
//!
//! Puts the local terminal in raw mode and forwards keystrokes to the
//! primary terminal session. Output is written straight to stdout.

use std::io::{self, Write};

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use futures::StreamExt;
use simbox_core::terminal::ShellErrorWatcher;
use simbox_core::AppContext;
use simbox_utils::Result;
use tracing::{info, warn};

/// Raw mode for as long as the guard lives
struct RawMode;

impl RawMode {
    fn enable() -> Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            tracing::error!("Failed to restore terminal: {}", e);
        }
    }
}

pub async fn run(ctx: &AppContext) -> Result<i32> {
    ctx.start().await?;
    let session = ctx.terminals().primary().await?;
    let Some(mut output) = session.take_output() else {
        eprintln!("Shell output is already attached elsewhere");
        return Ok(1);
    };

    eprintln!("Connected. Press Ctrl-] to detach.");
    info!(session_id = %session.id(), "Attached interactive shell");

    let _raw = RawMode::enable()?;
    if let Ok((columns, rows)) = crossterm::terminal::size() {
        session.resize(columns, rows);
    }

    let mut events = EventStream::new();
    let mut watcher = ShellErrorWatcher::new();
    let mut stdout = io::stdout();

    let code = loop {
        tokio::select! {
            event = events.next() => {
                match event {
                    Some(Ok(Event::Key(key))) => {
                        if key.kind == KeyEventKind::Release {
                            continue;
                        }
                        if is_detach(&key) {
                            break 0;
                        }
                        if key.code == KeyCode::Enter {
                            watcher.clear();
                        }
                        if let Some(bytes) = key_to_bytes(&key) {
                            session.write_input(bytes);
                        }
                    }
                    Some(Ok(Event::Paste(text))) => session.write_str(&text),
                    Some(Ok(Event::Resize(columns, rows))) => session.resize(columns, rows),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("Terminal input error: {}", e);
                        break 1;
                    }
                    None => break 0,
                }
            }

            chunk = output.next() => {
                match chunk {
                    Some(Ok(text)) => {
                        stdout.write_all(text.as_bytes())?;
                        stdout.flush()?;
                        if let Some(report) = watcher.push(&text) {
                            warn!(output = %report, "Shell command reported an error");
                        }
                    }
                    Some(Err(e)) => {
                        warn!("Shell transport error: {}", e);
                        break 1;
                    }
                    None => {
                        info!("Remote shell closed");
                        break 0;
                    }
                }
            }
        }
    };

    drop(_raw);
    eprintln!();
    Ok(code)
}

/// Ctrl-] leaves the shell without touching the remote session
fn is_detach(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(key.code, KeyCode::Char(']') | KeyCode::Char('5'))
}

/// Bytes a PTY expects for a key press
fn key_to_bytes(key: &KeyEvent) -> Option<Vec<u8>> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);

    let mut bytes = match key.code {
        KeyCode::Char(c) if ctrl && c.is_ascii_alphabetic() => {
            vec![(c.to_ascii_lowercase() as u8) - b'a' + 1]
        }
        KeyCode::Char(c) => c.to_string().into_bytes(),
        KeyCode::Enter => vec![b'\r'],
        KeyCode::Tab => vec![b'\t'],
        KeyCode::BackTab => b"\x1b[Z".to_vec(),
        KeyCode::Backspace => vec![0x7f],
        KeyCode::Esc => vec![0x1b],
        KeyCode::Up => b"\x1b[A".to_vec(),
        KeyCode::Down => b"\x1b[B".to_vec(),
        KeyCode::Right => b"\x1b[C".to_vec(),
        KeyCode::Left => b"\x1b[D".to_vec(),
        KeyCode::Home => b"\x1b[H".to_vec(),
        KeyCode::End => b"\x1b[F".to_vec(),
        KeyCode::PageUp => b"\x1b[5~".to_vec(),
        KeyCode::PageDown => b"\x1b[6~".to_vec(),
        KeyCode::Insert => b"\x1b[2~".to_vec(),
        KeyCode::Delete => b"\x1b[3~".to_vec(),
        _ => return None,
    };

    if alt {
        bytes.insert(0, 0x1b);
    }
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_plain_characters() {
        assert_eq!(
            key_to_bytes(&key(KeyCode::Char('a'), KeyModifiers::NONE)),
            Some(b"a".to_vec())
        );
        assert_eq!(
            key_to_bytes(&key(KeyCode::Char('é'), KeyModifiers::NONE)),
            Some("é".as_bytes().to_vec())
        );
    }

    #[test]
    fn test_control_characters() {
        assert_eq!(
            key_to_bytes(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(vec![0x03])
        );
        assert_eq!(
            key_to_bytes(&key(KeyCode::Char('D'), KeyModifiers::CONTROL)),
            Some(vec![0x04])
        );
    }

    #[test]
    fn test_alt_prefixes_escape() {
        assert_eq!(
            key_to_bytes(&key(KeyCode::Char('b'), KeyModifiers::ALT)),
            Some(vec![0x1b, b'b'])
        );
    }

    #[test]
    fn test_navigation_keys() {
        assert_eq!(
            key_to_bytes(&key(KeyCode::Enter, KeyModifiers::NONE)),
            Some(vec![b'\r'])
        );
        assert_eq!(
            key_to_bytes(&key(KeyCode::Up, KeyModifiers::NONE)),
            Some(b"\x1b[A".to_vec())
        );
        assert_eq!(
            key_to_bytes(&key(KeyCode::Delete, KeyModifiers::NONE)),
            Some(b"\x1b[3~".to_vec())
        );
        assert_eq!(key_to_bytes(&key(KeyCode::F(5), KeyModifiers::NONE)), None);
    }

    #[test]
    fn test_detach_key() {
        assert!(is_detach(&key(KeyCode::Char(']'), KeyModifiers::CONTROL)));
        assert!(!is_detach(&key(KeyCode::Char(']'), KeyModifiers::NONE)));
        assert!(!is_detach(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)));
    }
}
