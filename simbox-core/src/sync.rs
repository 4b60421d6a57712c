//! Pending-write reconciliation
//!
//! Writes that could not be persisted when they happened are parked here and
//! retried by a periodic drain. Entries are retried strictly in FIFO order,
//! one at a time, and abandoned after a fixed number of failed retries.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use simbox_protocol::UploadRequest;
use simbox_utils::Result;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::remote::RemoteStoreClient;

/// Capacity of the sync event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Kind of mutation waiting to be persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    Write,
    MakeDirectory,
}

/// A mutation applied locally but not yet confirmed remotely
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSyncEntry {
    pub path: String,
    pub content: String,
    pub operation: SyncOperation,
    pub retry_count: u32,
    pub is_binary_encoded: bool,
}

impl PendingSyncEntry {
    pub fn write(path: impl Into<String>, content: impl Into<String>, is_binary_encoded: bool) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            operation: SyncOperation::Write,
            retry_count: 0,
            is_binary_encoded,
        }
    }

    pub fn make_directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: String::new(),
            operation: SyncOperation::MakeDirectory,
            retry_count: 0,
            is_binary_encoded: false,
        }
    }

    /// Upload body that persists this entry
    pub fn to_request(&self) -> UploadRequest {
        match self.operation {
            SyncOperation::Write => {
                UploadRequest::new(&self.path, &self.content, self.is_binary_encoded)
            }
            SyncOperation::MakeDirectory => UploadRequest::directory_marker(&self.path),
        }
    }
}

/// Outcome of one retry, published to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The entry was persisted and removed
    Synced {
        path: String,
        operation: SyncOperation,
    },
    /// The retry failed; the entry stays queued
    RetryFailed {
        path: String,
        operation: SyncOperation,
        retry_count: u32,
        error: String,
    },
    /// The retry limit was reached; the entry was dropped
    Abandoned {
        path: String,
        operation: SyncOperation,
        retry_count: u32,
        error: String,
    },
}

/// Counts from one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub synced: usize,
    pub failed: usize,
    pub abandoned: usize,
}

/// Ordered list of pending mutations with bounded retry
pub struct SyncQueue {
    remote: Arc<RemoteStoreClient>,
    max_retries: u32,
    pending: Mutex<VecDeque<(u64, PendingSyncEntry)>>,
    next_seq: AtomicU64,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncQueue {
    pub fn new(remote: Arc<RemoteStoreClient>, max_retries: u32) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            remote,
            max_retries,
            pending: Mutex::new(VecDeque::new()),
            next_seq: AtomicU64::new(0),
            events,
        }
    }

    /// Append an entry to the back of the queue
    ///
    /// A write replaces any write to the same path still waiting.
    pub fn enqueue(&self, entry: PendingSyncEntry) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        debug!(path = %entry.path, operation = ?entry.operation, "Queued for sync");
        let mut pending = self.pending.lock();
        if entry.operation == SyncOperation::Write {
            pending.retain(|(_, queued)| !is_write_to(queued, &entry.path));
        }
        pending.push_back((seq, entry));
    }

    /// Drop queued writes to `path`, returning how many were removed
    ///
    /// Called once newer content for `path` has reached the store.
    pub fn supersede(&self, path: &str) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|(_, queued)| !is_write_to(queued, path));
        let removed = before - pending.len();
        if removed > 0 {
            debug!(path, removed, "Dropped superseded writes");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Copy of the pending entries in queue order
    pub fn pending(&self) -> Vec<PendingSyncEntry> {
        self.pending.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    /// Whether any entry targets `path`
    pub fn contains(&self, path: &str) -> bool {
        self.pending.lock().iter().any(|(_, e)| e.path == path)
    }

    /// Subscribe to per-entry outcomes
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Retry every entry that was queued when the pass started
    ///
    /// Entries are awaited one after another; the queue lock is never held
    /// across a request.
    pub async fn drain_once(&self) -> DrainReport {
        let batch: Vec<u64> = self.pending.lock().iter().map(|(seq, _)| *seq).collect();
        let mut report = DrainReport::default();

        for seq in batch {
            let entry = {
                let pending = self.pending.lock();
                match pending.iter().find(|(s, _)| *s == seq) {
                    Some((_, entry)) => entry.clone(),
                    None => continue,
                }
            };

            let result = self.persist(&entry).await;

            let mut pending = self.pending.lock();
            let Some(index) = pending.iter().position(|(s, _)| *s == seq) else {
                continue;
            };

            match result {
                Ok(()) => {
                    pending.remove(index);
                    drop(pending);
                    report.synced += 1;
                    info!(path = %entry.path, operation = ?entry.operation, "Synced pending entry");
                    let _ = self.events.send(SyncEvent::Synced {
                        path: entry.path,
                        operation: entry.operation,
                    });
                }
                Err(e) => {
                    let retry_count = {
                        let (_, queued) = &mut pending[index];
                        queued.retry_count += 1;
                        queued.retry_count
                    };

                    if retry_count >= self.max_retries {
                        pending.remove(index);
                        drop(pending);
                        report.abandoned += 1;
                        warn!(
                            path = %entry.path,
                            operation = ?entry.operation,
                            retry_count,
                            error = %e,
                            "Abandoning pending entry after max retries"
                        );
                        let _ = self.events.send(SyncEvent::Abandoned {
                            path: entry.path,
                            operation: entry.operation,
                            retry_count,
                            error: e.to_string(),
                        });
                    } else {
                        drop(pending);
                        report.failed += 1;
                        debug!(path = %entry.path, retry_count, error = %e, "Sync retry failed");
                        let _ = self.events.send(SyncEvent::RetryFailed {
                            path: entry.path,
                            operation: entry.operation,
                            retry_count,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        report
    }

    async fn persist(&self, entry: &PendingSyncEntry) -> Result<()> {
        self.remote.upload_request(&entry.to_request()).await
    }

    /// Run `drain_once` every `interval` until `cancel` fires
    pub fn spawn_drain(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Sync drain cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if self.is_empty() {
                            continue;
                        }
                        let report = self.drain_once().await;
                        debug!(?report, remaining = self.len(), "Sync drain pass complete");
                    }
                }
            }
        })
    }
}

fn is_write_to(entry: &PendingSyncEntry, path: &str) -> bool {
    entry.operation == SyncOperation::Write && entry.path == path
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn queue_for(server: &MockServer, max_retries: u32) -> SyncQueue {
        let remote =
            RemoteStoreClient::with_base_url(&server.uri(), "u1", Duration::from_secs(5)).unwrap();
        SyncQueue::new(Arc::new(remote), max_retries)
    }

    fn ok() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"success": true}))
    }

    #[test]
    fn test_directory_entry_request() {
        let req = PendingSyncEntry::make_directory("src/util").to_request();
        assert_eq!(req.key, "src/util/.gitkeep");
        assert!(req.content.is_empty());
    }

    #[tokio::test]
    async fn test_removed_after_successful_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/u1/oss/upload"))
            .respond_with(ok())
            .expect(1)
            .mount(&server)
            .await;

        let queue = queue_for(&server, 3);
        let mut events = queue.subscribe();
        queue.enqueue(PendingSyncEntry::write("a.txt", "hello", false));

        let report = queue.drain_once().await;
        assert_eq!(report.synced, 1);
        assert!(queue.is_empty());
        assert_eq!(
            events.recv().await.unwrap(),
            SyncEvent::Synced {
                path: "a.txt".into(),
                operation: SyncOperation::Write
            }
        );
    }

    #[tokio::test]
    async fn test_abandoned_after_exactly_max_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/u1/oss/upload"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let queue = queue_for(&server, 3);
        let mut events = queue.subscribe();
        queue.enqueue(PendingSyncEntry::write("a.txt", "hello", false));

        queue.drain_once().await;
        assert_eq!(queue.pending()[0].retry_count, 1);
        queue.drain_once().await;
        assert_eq!(queue.pending()[0].retry_count, 2);

        let report = queue.drain_once().await;
        assert_eq!(report.abandoned, 1);
        assert!(queue.is_empty());

        // Nothing left to retry a fourth time
        let report = queue.drain_once().await;
        assert_eq!(report, DrainReport::default());

        let mut last = None;
        while let Ok(event) = events.try_recv() {
            last = Some(event);
        }
        assert!(matches!(
            last,
            Some(SyncEvent::Abandoned { retry_count: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_fifo_order_within_pass() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ok())
            .mount(&server)
            .await;

        let queue = queue_for(&server, 3);
        queue.enqueue(PendingSyncEntry::write("first", "1", false));
        queue.enqueue(PendingSyncEntry::make_directory("second"));
        queue.enqueue(PendingSyncEntry::write("third", "3", false));
        queue.drain_once().await;

        let keys: Vec<String> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| {
                let body: serde_json::Value = serde_json::from_slice(&r.body).unwrap();
                body["key"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(keys, vec!["first", "second/.gitkeep", "third"]);
    }

    #[test]
    fn test_enqueue_replaces_older_write() {
        let remote =
            RemoteStoreClient::with_base_url("http://127.0.0.1:1", "u1", Duration::from_secs(1))
                .unwrap();
        let queue = SyncQueue::new(Arc::new(remote), 3);
        queue.enqueue(PendingSyncEntry::write("a.txt", "v1", false));
        queue.enqueue(PendingSyncEntry::make_directory("a.txt.d"));
        queue.enqueue(PendingSyncEntry::write("b.txt", "b", false));
        queue.enqueue(PendingSyncEntry::write("a.txt", "v2", false));

        let pending = queue.pending();
        let entries: Vec<(&str, &str)> = pending
            .iter()
            .map(|e| (e.path.as_str(), e.content.as_str()))
            .collect();
        assert_eq!(entries, vec![("a.txt.d", ""), ("b.txt", "b"), ("a.txt", "v2")]);
    }

    #[test]
    fn test_supersede_only_drops_writes() {
        let remote =
            RemoteStoreClient::with_base_url("http://127.0.0.1:1", "u1", Duration::from_secs(1))
                .unwrap();
        let queue = SyncQueue::new(Arc::new(remote), 3);
        queue.enqueue(PendingSyncEntry::make_directory("src"));
        queue.enqueue(PendingSyncEntry::write("src", "x", false));
        queue.enqueue(PendingSyncEntry::write("other", "y", false));

        assert_eq!(queue.supersede("src"), 1);
        assert_eq!(queue.supersede("src"), 0);
        let ops: Vec<(String, SyncOperation)> = queue
            .pending()
            .into_iter()
            .map(|e| (e.path, e.operation))
            .collect();
        assert_eq!(
            ops,
            vec![
                ("src".to_string(), SyncOperation::MakeDirectory),
                ("other".to_string(), SyncOperation::Write),
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_keeps_later_entries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({"key": "bad", "content": "x", "isBinaryEncoded": false})))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ok())
            .mount(&server)
            .await;

        let queue = queue_for(&server, 3);
        queue.enqueue(PendingSyncEntry::write("bad", "x", false));
        queue.enqueue(PendingSyncEntry::write("good", "y", false));

        let report = queue.drain_once().await;
        assert_eq!(report.synced, 1);
        assert_eq!(report.failed, 1);

        let pending = queue.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].path, "bad");
        assert!(queue.contains("bad"));
        assert!(!queue.contains("good"));
    }

    #[tokio::test]
    async fn test_spawned_drain_stops_on_cancel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ok())
            .mount(&server)
            .await;

        let queue = Arc::new(queue_for(&server, 3));
        queue.enqueue(PendingSyncEntry::write("a", "1", false));

        let cancel = CancellationToken::new();
        let handle = queue
            .clone()
            .spawn_drain(Duration::from_millis(20), cancel.clone());

        tokio::time::timeout(Duration::from_secs(5), async {
            while !queue.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        handle.await.unwrap();
    }
}
