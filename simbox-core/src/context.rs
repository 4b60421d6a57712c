//! Application context
//!
//! Owns every long-lived component. Construct it once with [`AppContext::new`],
//! call [`AppContext::start`] before use and [`AppContext::shutdown`] on exit.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use simbox_utils::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{new_config_handle, AppConfig, ConfigHandle};
use crate::domains::{DomainResolver, Endpoints};
use crate::remote::RemoteStoreClient;
use crate::sync::SyncQueue;
use crate::terminal::{SessionOptions, TerminalRegistry};
use crate::vfs::VirtualFileTree;

pub struct AppContext {
    config: ConfigHandle,
    remote: Arc<RemoteStoreClient>,
    sync: Arc<SyncQueue>,
    vfs: Arc<VirtualFileTree>,
    terminals: Arc<TerminalRegistry>,
    endpoints: ArcSwapOption<Endpoints>,
    cancel: CancellationToken,
    drain: Mutex<Option<JoinHandle<()>>>,
}

impl AppContext {
    /// Wire up the components; performs no I/O
    pub fn new(config: AppConfig) -> Result<Self> {
        let remote = Arc::new(RemoteStoreClient::new(&config.remote)?);
        let sync = Arc::new(SyncQueue::new(remote.clone(), config.sync.max_retries));
        let vfs = Arc::new(VirtualFileTree::new(
            remote.clone(),
            sync.clone(),
            config.workspace.workdir.clone(),
        ));
        let terminals = Arc::new(TerminalRegistry::new(
            SessionOptions::from_config(&config.terminal, &config.workspace),
            Duration::from_secs(config.terminal.exec_timeout_secs),
        ));

        Ok(Self {
            config: new_config_handle(config),
            remote,
            sync,
            vfs,
            terminals,
            endpoints: ArcSwapOption::empty(),
            cancel: CancellationToken::new(),
            drain: Mutex::new(None),
        })
    }

    /// Start the sync drain, then resolve the terminal endpoint
    pub async fn start(&self) -> Result<()> {
        self.start_sync();
        self.connect_terminals().await
    }

    /// Start the periodic sync drain if it is not running
    pub fn start_sync(&self) {
        let mut drain = self.drain.lock();
        if drain.is_some() {
            return;
        }

        let interval = Duration::from_secs(self.config.load().sync.interval_secs);
        *drain = Some(self.sync.clone().spawn_drain(interval, self.cancel.child_token()));
        debug!(?interval, "Sync drain started");
    }

    /// Resolve remote domains (with retry) and point terminals at them
    pub async fn connect_terminals(&self) -> Result<()> {
        let config = self.config();
        let resolver = DomainResolver::new(self.remote.clone());
        let endpoints = resolver.resolve_with_retry(&config.domains).await?;

        self.terminals.set_endpoint(endpoints.terminal_url()?);
        self.endpoints.store(Some(Arc::new(endpoints)));
        Ok(())
    }

    /// Retry pending writes until the queue is empty
    ///
    /// Every failing entry is abandoned after `max_retries` passes, so this
    /// runs at most that many passes.
    pub async fn flush_pending(&self) {
        let config = self.config();
        let interval = Duration::from_secs(config.sync.interval_secs);

        for pass in 0..config.sync.max_retries {
            if self.sync.is_empty() {
                return;
            }
            if pass > 0 {
                tokio::time::sleep(interval).await;
            }
            let report = self.sync.drain_once().await;
            debug!(pass, ?report, "Flush pass complete");
        }
    }

    /// Kill all terminals and stop background work
    pub async fn shutdown(&self) {
        self.terminals.kill_all().await;
        self.cancel.cancel();

        let drain = self.drain.lock().take();
        if let Some(handle) = drain {
            let _ = handle.await;
        }

        let pending = self.sync.len();
        if pending > 0 {
            warn!(pending, "Shutting down with unsynced changes");
        }
        info!("Context shut down");
    }

    pub fn config(&self) -> Arc<AppConfig> {
        self.config.load_full()
    }

    pub fn remote(&self) -> &Arc<RemoteStoreClient> {
        &self.remote
    }

    pub fn vfs(&self) -> &Arc<VirtualFileTree> {
        &self.vfs
    }

    pub fn sync(&self) -> &Arc<SyncQueue> {
        &self.sync
    }

    pub fn terminals(&self) -> &Arc<TerminalRegistry> {
        &self.terminals
    }

    /// Endpoints from the last successful resolution
    pub fn endpoints(&self) -> Option<Arc<Endpoints>> {
        self.endpoints.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::testing::{FakePty, PtyBehavior};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> AppConfig {
        let mut config = AppConfig::default();
        config.remote.api_base_url = server.uri();
        config.remote.namespace = "u1".into();
        config.sync.interval_secs = 1;
        config.domains.retry_interval_secs = 1;
        config.domains.max_attempts = Some(2);
        config.terminal.exec_timeout_secs = 5;
        config
    }

    #[tokio::test]
    async fn test_start_exec_shutdown() {
        let pty = FakePty::start(PtyBehavior::Shell).await;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/u1/domains"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"domains": [pty.host(), "preview.host"], "token": "test-token"}
            })))
            .mount(&server)
            .await;

        let ctx = AppContext::new(config_for(&server)).unwrap();
        ctx.start().await.unwrap();

        let endpoints = ctx.endpoints().unwrap();
        assert_eq!(endpoints.preview_hosts, vec!["preview.host"]);

        let result = ctx.terminals().exec("echo", &["ok".into()]).await;
        assert_eq!(result.output, "ok");

        ctx.terminals().attach().await.unwrap();
        ctx.shutdown().await;
        assert!(ctx.terminals().is_empty());
    }

    #[tokio::test]
    async fn test_start_fails_when_domains_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let ctx = AppContext::new(config_for(&server)).unwrap();
        assert!(ctx.start().await.is_err());
        assert!(ctx.endpoints().is_none());
        ctx.shutdown().await;
    }

    #[tokio::test]
    async fn test_flush_pending_syncs_queued_write() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/u1/oss/upload"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/u1/oss/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;

        let ctx = AppContext::new(config_for(&server)).unwrap();
        ctx.vfs().write("a.txt", b"hello").await.unwrap();
        assert_eq!(ctx.sync().len(), 1);

        ctx.flush_pending().await;
        assert!(ctx.sync().is_empty());
        assert_eq!(ctx.vfs().read("a.txt").await.unwrap(), b"hello");
    }
}
