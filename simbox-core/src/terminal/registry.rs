//! Live terminal sessions by id
//!
//! Sessions are created on demand against the resolved terminal endpoint.
//! One of them may be held as the primary session, which is created lazily
//! and used for fire-and-forget commands.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use simbox_utils::{Result, SimboxError};
use tokio::sync::Mutex;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::exec::{collect_until, command_line, extract_output, CommandOutput, Marker};
use super::session::{SessionInfo, SessionOptions, SessionState, TerminalSession};

/// Registry of terminal sessions
pub struct TerminalRegistry {
    sessions: DashMap<Uuid, Arc<TerminalSession>>,
    endpoint: ArcSwapOption<Url>,
    options: SessionOptions,
    exec_timeout: Duration,
    primary: Mutex<Option<Arc<TerminalSession>>>,
}

impl TerminalRegistry {
    pub fn new(options: SessionOptions, exec_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            endpoint: ArcSwapOption::empty(),
            options,
            exec_timeout,
            primary: Mutex::new(None),
        }
    }

    /// Point new sessions at `url`
    pub fn set_endpoint(&self, url: Url) {
        debug!(endpoint = %url, "Terminal endpoint set");
        self.endpoint.store(Some(Arc::new(url)));
    }

    pub fn endpoint(&self) -> Option<Arc<Url>> {
        self.endpoint.load_full()
    }

    /// Connect a new session and register it
    pub async fn create(&self) -> Result<Arc<TerminalSession>> {
        let url = self.endpoint().ok_or(SimboxError::EndpointUnresolved)?;
        let session = Arc::new(TerminalSession::connect(&url, &self.options).await?);
        self.sessions.insert(session.id(), session.clone());
        Ok(session)
    }

    /// Create a session and wait for it to become interactive
    ///
    /// Connecting and waiting share one `exec_timeout` budget. A session
    /// that is not interactive by then is killed.
    pub async fn attach(&self) -> Result<Arc<TerminalSession>> {
        let deadline = Instant::now() + self.exec_timeout;
        let session = timeout_at(deadline, self.create())
            .await
            .map_err(|_| self.timed_out())??;

        let ready = timeout_at(deadline, session.ready())
            .await
            .map_err(|_| self.timed_out())
            .and_then(|r| r);
        if let Err(e) = ready {
            self.kill(session.id());
            return Err(e);
        }
        Ok(session)
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<TerminalSession>> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    /// All registered sessions, oldest first
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.sessions.iter().map(|entry| entry.value().info()).collect();
        sessions.sort_by_key(|info| info.created_at);
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove a session and close its transport
    pub fn kill(&self, id: Uuid) -> Option<Arc<TerminalSession>> {
        let (_, session) = self.sessions.remove(&id)?;
        session.close();
        info!(session_id = %id, "Terminal session killed");
        Some(session)
    }

    /// Kill every session, the primary included
    pub async fn kill_all(&self) {
        self.primary.lock().await.take();
        let ids: Vec<Uuid> = self.sessions.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            self.kill(id);
        }
    }

    /// Forward a resize to every live session
    pub fn resize_all(&self, columns: u16, rows: u16) {
        for entry in self.sessions.iter() {
            entry.value().resize(columns, rows);
        }
    }

    /// The primary session, attaching one if none is open
    pub async fn primary(&self) -> Result<Arc<TerminalSession>> {
        let mut primary = self.primary.lock().await;
        if let Some(session) = primary.as_ref() {
            if session.state() != SessionState::Closed {
                return Ok(session.clone());
            }
            self.kill(session.id());
        }

        let session = self.attach().await?;
        *primary = Some(session.clone());
        Ok(session)
    }

    /// Type `command args` into the primary session without waiting
    pub async fn spawn(&self, command: &str, args: &[String]) -> CommandOutput {
        let session = match self.primary().await {
            Ok(session) => session,
            Err(e) => return CommandOutput::failure(format!("terminal session is not open: {}", e)),
        };
        if session.state() != SessionState::Ready {
            return CommandOutput::failure("terminal session is not open");
        }

        let line = command_line(command, args);
        debug!(session_id = %session.id(), command = %line, "Spawning command");
        session.write_str(&format!("{}\n", line));
        CommandOutput::success("")
    }

    /// Run a command on a temporary session and collect its output
    ///
    /// Failures, including running out of time, come back as exit code 1
    /// with the error text as output.
    pub async fn exec(&self, command: &str, args: &[String]) -> CommandOutput {
        let line = command_line(command, args);
        match self.exec_line(&line).await {
            Ok(output) => CommandOutput::success(output),
            Err(e) => {
                warn!(command = %line, error = %e, "Command failed");
                CommandOutput::failure(e.to_string())
            }
        }
    }

    /// Connect, wait for the prompt and collect, all within `exec_timeout`
    async fn exec_line(&self, line: &str) -> Result<String> {
        let deadline = Instant::now() + self.exec_timeout;
        let session = timeout_at(deadline, self.create())
            .await
            .map_err(|_| self.timed_out())??;

        let result = timeout_at(deadline, self.run_marked(&session, line))
            .await
            .map_err(|_| self.timed_out())
            .and_then(|r| r);
        self.kill(session.id());
        result
    }

    fn timed_out(&self) -> SimboxError {
        SimboxError::Timeout {
            seconds: self.exec_timeout.as_secs(),
        }
    }

    async fn run_marked(&self, session: &TerminalSession, line: &str) -> Result<String> {
        let mut output = session
            .take_output()
            .ok_or_else(|| SimboxError::internal("output stream already taken"))?;
        session.ready().await?;

        let marker = Marker::generate();
        let typed = marker.typed_line(line);
        session.write_str(&format!("{}\n", typed));

        let raw = collect_until(&mut output, &marker.text()).await?;

        Ok(extract_output(&raw, &typed, line, &marker.text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::testing::{FakePty, PtyBehavior, PtyEvent};
    use simbox_protocol::{ClientFrame, WindowSize};

    fn options() -> SessionOptions {
        SessionOptions {
            subprotocol: "tty".into(),
            size: WindowSize::new(80, 40),
            bootstrap_command: Some("cd project\n".into()),
        }
    }

    async fn registry_for(behavior: PtyBehavior, exec_timeout: Duration) -> (TerminalRegistry, FakePty) {
        let pty = FakePty::start(behavior).await;
        let registry = TerminalRegistry::new(options(), exec_timeout);
        registry.set_endpoint(pty.url.clone());
        (registry, pty)
    }

    #[tokio::test]
    async fn test_create_without_endpoint() {
        let registry = TerminalRegistry::new(options(), Duration::from_secs(1));
        let err = registry.create().await.unwrap_err();
        assert!(matches!(err, SimboxError::EndpointUnresolved));
    }

    #[tokio::test]
    async fn test_kill_removes_and_closes() {
        let (registry, mut pty) = registry_for(PtyBehavior::Shell, Duration::from_secs(5)).await;
        let session = registry.attach().await.unwrap();
        let id = session.id();
        assert!(registry.get(id).is_some());
        assert_eq!(registry.list().len(), 1);

        registry.kill(id).unwrap();
        assert!(registry.get(id).is_none());
        assert!(registry.kill(id).is_none());

        tokio::time::timeout(Duration::from_secs(5), session.closed())
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(pty.drain_events().await.last(), Some(&PtyEvent::Closed));
    }

    #[tokio::test]
    async fn test_kill_all_and_resize_all() {
        let (registry, _pty) = registry_for(PtyBehavior::Shell, Duration::from_secs(5)).await;
        let a = registry.attach().await.unwrap();
        let b = registry.attach().await.unwrap();
        assert_ne!(a.id(), b.id());

        registry.resize_all(100, 50);
        let primary = registry.primary().await.unwrap();
        assert_eq!(registry.len(), 3);

        registry.kill_all().await;
        assert!(registry.is_empty());
        for session in [a, b, primary] {
            tokio::time::timeout(Duration::from_secs(5), session.closed())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_primary_is_reused() {
        let (registry, _pty) = registry_for(PtyBehavior::Shell, Duration::from_secs(5)).await;
        let first = registry.primary().await.unwrap();
        let second = registry.primary().await.unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(registry.len(), 1);

        registry.kill_all().await;
        let third = registry.primary().await.unwrap();
        assert_ne!(third.id(), first.id());
    }

    #[tokio::test]
    async fn test_exec_collects_output() {
        let (registry, _pty) = registry_for(PtyBehavior::Shell, Duration::from_secs(5)).await;
        let result = registry.exec("echo", &["hello world".into()]).await;
        assert_eq!(result, CommandOutput::success("hello world"));
        // The temporary session is gone
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_exec_times_out() {
        let (registry, _pty) = registry_for(PtyBehavior::Shell, Duration::from_secs(1)).await;
        let result = registry.exec("hang", &[]).await;
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.output, "Timed out after 1s");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_exec_times_out_on_silent_host() {
        let (registry, mut pty) = registry_for(PtyBehavior::Silent, Duration::from_secs(1)).await;
        let result = tokio::time::timeout(Duration::from_secs(5), registry.exec("ls", &[]))
            .await
            .expect("exec outlived its deadline");
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.output, "Timed out after 1s");
        assert!(registry.is_empty());
        assert_eq!(pty.drain_events().await.last(), Some(&PtyEvent::Closed));
    }

    #[tokio::test]
    async fn test_attach_times_out_on_silent_host() {
        let (registry, _pty) = registry_for(PtyBehavior::Silent, Duration::from_secs(1)).await;
        let err = tokio::time::timeout(Duration::from_secs(5), registry.attach())
            .await
            .expect("attach outlived its deadline")
            .unwrap_err();
        assert!(matches!(err, SimboxError::Timeout { seconds: 1 }));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_reports_silent_host() {
        let (registry, _pty) = registry_for(PtyBehavior::Silent, Duration::from_secs(1)).await;
        let result = tokio::time::timeout(Duration::from_secs(5), registry.spawn("ls", &[]))
            .await
            .expect("spawn outlived its deadline");
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.output, "terminal session is not open: Timed out after 1s");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_exec_reports_closed_transport() {
        let (registry, _pty) =
            registry_for(PtyBehavior::CloseImmediately, Duration::from_secs(5)).await;
        let result = registry.exec("ls", &[]).await;
        assert!(!result.is_success());
        assert_eq!(result.output, "Connection closed unexpectedly");
    }

    #[tokio::test]
    async fn test_spawn_types_into_primary() {
        let (registry, mut pty) = registry_for(PtyBehavior::Shell, Duration::from_secs(5)).await;
        let result = registry
            .spawn("npm", &["run".into(), "dev".into()])
            .await;
        assert_eq!(result, CommandOutput::success(""));

        registry.kill_all().await;
        let frames: Vec<ClientFrame> = pty
            .drain_events()
            .await
            .into_iter()
            .filter_map(|e| match e {
                PtyEvent::Frame(f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(
            frames,
            vec![
                ClientFrame::input_text("cd project\n"),
                ClientFrame::input_text("npm run dev\n"),
            ]
        );
    }

    #[tokio::test]
    async fn test_spawn_without_endpoint() {
        let registry = TerminalRegistry::new(options(), Duration::from_secs(1));
        let result = registry.spawn("ls", &[]).await;
        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("terminal session is not open"));
    }
}
