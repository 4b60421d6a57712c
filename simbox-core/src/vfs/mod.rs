//! Virtual file tree
//!
//! In-memory cache of the remote workspace. Reads are served from the cache
//! and fall back to the object store; writes land in the cache first and are
//! then pushed remotely, with failures parked in the [`SyncQueue`].
//!
//! The arena lock is a plain mutex and is never held across an `.await`.

mod arena;

pub use arena::{normalize, NodeId, NodeKind};

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;
use simbox_protocol::GITKEEP_FILE;
use simbox_utils::{Result, SimboxError};
use tracing::{debug, info, warn};

use crate::remote::RemoteStoreClient;
use crate::sync::{PendingSyncEntry, SyncQueue};
use arena::{segments, Arena};

/// What a path currently denotes in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    File,
    Directory,
}

struct TreeState {
    arena: Arena,
    /// Set once the root has been filled from a remote listing
    root_loaded: bool,
}

/// Write-through, read-through cache over the object store
pub struct VirtualFileTree {
    state: Mutex<TreeState>,
    remote: Arc<RemoteStoreClient>,
    sync: Arc<SyncQueue>,
    workdir: String,
}

impl VirtualFileTree {
    pub fn new(remote: Arc<RemoteStoreClient>, sync: Arc<SyncQueue>, workdir: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(TreeState {
                arena: Arena::new(),
                root_loaded: false,
            }),
            remote,
            sync,
            workdir: workdir.into(),
        }
    }

    /// Absolute path of a cache path inside the remote container
    pub fn to_workdir_path(&self, path: &str) -> String {
        let base = self.workdir.trim_end_matches('/');
        let rel = normalize(path);
        if rel.is_empty() {
            if base.is_empty() {
                "/".to_string()
            } else {
                base.to_string()
            }
        } else {
            format!("{}/{}", base, rel)
        }
    }

    /// Kind of entry cached at `path`, if any
    pub fn entry_type(&self, path: &str) -> Option<EntryType> {
        let state = self.state.lock();
        let id = state.arena.lookup(path)?;
        state.arena.get(id).map(|node| match node.kind {
            NodeKind::Directory { .. } => EntryType::Directory,
            NodeKind::File { .. } => EntryType::File,
        })
    }

    /// Store `data` at `path`, then persist it
    ///
    /// Valid UTF-8 is stored as text; anything else is stored base64-encoded
    /// and flagged binary. The cache update is never rolled back: a failed
    /// upload is queued for retry and the call still succeeds.
    pub async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let key = normalize(path);
        let (content, binary) = match std::str::from_utf8(data) {
            Ok(text) => (text.to_string(), false),
            Err(_) => (BASE64.encode(data), true),
        };

        self.store_file(&key, Some(content.clone()), binary)?;

        match self.remote.upload(&key, &content, binary).await {
            Ok(()) => {
                self.sync.supersede(&key);
            }
            Err(e) => {
                warn!(path = %key, error = %e, "Upload failed, queueing for retry");
                self.sync
                    .enqueue(PendingSyncEntry::write(key, content, binary));
            }
        }
        Ok(())
    }

    /// Read the bytes stored at `path`
    ///
    /// On a miss the file is downloaded, cached as text and returned.
    pub async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let key = normalize(path);

        {
            let state = self.state.lock();
            if let Some(node) = state.arena.lookup(&key).and_then(|id| state.arena.get(id)) {
                match &node.kind {
                    NodeKind::Directory { .. } => return Err(SimboxError::IsADirectory(key)),
                    NodeKind::File {
                        content: Some(content),
                        binary,
                    } => return decode(&key, content, *binary),
                    // Listed but never fetched
                    NodeKind::File { content: None, .. } => {}
                }
            }
        }

        let content = self.remote.download(&key).await?;
        debug!(path = %key, bytes = content.len(), "Cached remote file");
        self.store_file(&key, Some(content.clone()), false)?;
        Ok(content.into_bytes())
    }

    /// Read `path` as UTF-8 text
    pub async fn read_to_string(&self, path: &str) -> Result<String> {
        let bytes = self.read(path).await?;
        String::from_utf8(bytes).map_err(|_| {
            SimboxError::internal(format!("{} does not contain UTF-8 text", normalize(path)))
        })
    }

    /// Child names of the directory at `path`, sorted
    pub async fn list_directory(&self, path: &str) -> Result<Vec<String>> {
        let prefix = normalize(path);

        {
            let state = self.state.lock();
            if let Some(id) = state.arena.lookup(&prefix) {
                let is_unloaded_root = id == state.arena.root()
                    && !state.root_loaded
                    && state.arena.child_names(id).is_empty();
                match state.arena.get(id).map(|n| &n.kind) {
                    Some(NodeKind::File { .. }) => return Err(SimboxError::NotADirectory(prefix)),
                    Some(NodeKind::Directory { .. }) if !is_unloaded_root => {
                        return Ok(state.arena.child_names(id));
                    }
                    _ => {}
                }
            }
        }

        let tree = self.remote.tree(&prefix).await?;
        let relative: Vec<&str> = tree
            .iter()
            .filter_map(|key| strip_prefix(key, &prefix))
            .collect();

        let exists = !relative.is_empty()
            || prefix.is_empty()
            || tree.iter().any(|key| is_directory_marker(key, &prefix));
        if !exists {
            return Err(SimboxError::NotFound(prefix));
        }

        let mut state = self.state.lock();
        let dir = state.arena.ensure_dirs(&prefix)?;
        for rel in relative {
            materialize(&mut state.arena, dir, rel);
        }
        if prefix.is_empty() {
            state.root_loaded = true;
        }

        debug!(path = %prefix, entries = tree.len(), "Populated directory from remote");
        Ok(state.arena.child_names(dir))
    }

    /// Create the directory at `path`
    ///
    /// Existing directories succeed untouched. New directories are persisted
    /// as a `.gitkeep` upload, queued for retry on failure.
    pub async fn make_directory(&self, path: &str, recursive: bool) -> Result<()> {
        let key = normalize(path);

        {
            let mut state = self.state.lock();
            let arena = &mut state.arena;

            match arena.lookup(&key).and_then(|id| arena.get(id)).map(|n| n.kind.is_dir()) {
                Some(true) => return Ok(()),
                Some(false) => return Err(SimboxError::AlreadyExists(key)),
                None => {}
            }

            if recursive {
                arena.ensure_dirs(&key)?;
            } else {
                let (parent_path, name) = split_parent(&key);
                let parent = arena
                    .lookup(parent_path)
                    .filter(|id| arena.get(*id).is_some_and(|n| n.kind.is_dir()))
                    .ok_or_else(|| SimboxError::NotFound(parent_path.to_string()))?;
                arena.attach(parent, name, NodeKind::empty_dir())?;
            }
        }

        let request = PendingSyncEntry::make_directory(key.clone());
        if let Err(e) = self.remote.upload_request(&request.to_request()).await {
            warn!(path = %key, error = %e, "Directory persist failed, queueing for retry");
            self.sync.enqueue(request);
        }
        Ok(())
    }

    /// Load every remote object under `prefix` into the cache
    ///
    /// Nothing is uploaded. Files with a pending local write keep their
    /// local content; per-file download failures are logged and skipped.
    /// Returns the number of files loaded.
    pub async fn hydrate(&self, prefix: &str) -> Result<usize> {
        let prefix = normalize(prefix);
        let tree = self.remote.tree(&prefix).await?;
        let mut loaded = 0;

        for key in &tree {
            if strip_prefix(key, &prefix).is_none() {
                continue;
            }

            let path = normalize(key);
            let (parent, name) = split_parent(&path);
            let dir = if key.ends_with('/') {
                Some(path.as_str())
            } else if name == GITKEEP_FILE {
                Some(parent)
            } else {
                None
            };
            if let Some(dir) = dir {
                if let Err(e) = self.state.lock().arena.ensure_dirs(dir) {
                    warn!(path = %dir, error = %e, "Skipping directory that conflicts with cache");
                }
                continue;
            }

            if self.sync.contains(&path) {
                debug!(path = %path, "Keeping locally pending content");
                continue;
            }

            match self.remote.download(&path).await {
                Ok(content) => {
                    if let Err(e) = self.store_file(&path, Some(content), false) {
                        warn!(path = %path, error = %e, "Skipping file that conflicts with cache");
                        continue;
                    }
                    loaded += 1;
                }
                Err(e) => warn!(path = %path, error = %e, "Skipping file that failed to download"),
            }
        }

        if prefix.is_empty() {
            self.state.lock().root_loaded = true;
        }
        info!(prefix = %prefix, files = loaded, "Hydrated cache from remote");
        Ok(loaded)
    }

    /// Absolute path to stored content for every fetched file
    ///
    /// Binary files appear in their base64 form.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        let state = self.state.lock();
        state
            .arena
            .files()
            .into_iter()
            .filter_map(|(path, kind)| match kind {
                NodeKind::File {
                    content: Some(content),
                    ..
                } => Some((self.to_workdir_path(&path), content.clone())),
                _ => None,
            })
            .collect()
    }

    fn store_file(&self, key: &str, content: Option<String>, binary: bool) -> Result<()> {
        let (parent_path, name) = split_parent(key);
        if name.is_empty() {
            return Err(SimboxError::IsADirectory("/".into()));
        }

        let mut state = self.state.lock();
        let arena = &mut state.arena;
        let parent = arena.ensure_dirs(parent_path)?;
        let kind = NodeKind::File { content, binary };

        match arena.child(parent, name) {
            Some(id) if arena.get(id).is_some_and(|n| n.kind.is_dir()) => {
                Err(SimboxError::IsADirectory(key.to_string()))
            }
            Some(id) => {
                arena.replace_kind(id, kind);
                Ok(())
            }
            None => arena.attach(parent, name, kind).map(|_| ()),
        }
    }
}

fn decode(key: &str, content: &str, binary: bool) -> Result<Vec<u8>> {
    if binary {
        BASE64
            .decode(content)
            .map_err(|e| SimboxError::internal(format!("corrupt binary entry {}: {}", key, e)))
    } else {
        Ok(content.as_bytes().to_vec())
    }
}

/// Split a normalized path into its parent path and final segment
fn split_parent(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", path),
    }
}

/// Part of a remote key below `prefix`, keeping any trailing `/`
///
/// Keys outside the prefix, and the prefix itself, yield `None`.
fn strip_prefix<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    let key = key.trim_start_matches('/');
    let rel = if prefix.is_empty() {
        key
    } else {
        key.strip_prefix(prefix)?.strip_prefix('/')?
    };
    if rel.trim_matches('/').is_empty() {
        None
    } else {
        Some(rel)
    }
}

/// True when `key` is the bare `prefix/` entry for an empty directory
fn is_directory_marker(key: &str, prefix: &str) -> bool {
    key.trim_start_matches('/')
        .strip_suffix('/')
        .is_some_and(|dir| dir.trim_end_matches('/') == prefix)
}

/// Insert one relative listing entry beneath `dir`
///
/// Intermediate segments become directories; the last segment is a directory
/// when the entry ends in `/`, otherwise an unfetched file. Existing entries
/// are kept.
fn materialize(arena: &mut Arena, dir: NodeId, rel: &str) {
    let is_dir = rel.ends_with('/');
    let parts = segments(rel);
    let Some((last, parents)) = parts.split_last() else {
        return;
    };

    let mut current = dir;
    for seg in parents {
        current = match arena.child(current, seg) {
            Some(id) if arena.get(id).is_some_and(|n| n.kind.is_dir()) => id,
            Some(_) => return,
            None => match arena.attach(current, seg, NodeKind::empty_dir()) {
                Ok(id) => id,
                Err(_) => return,
            },
        };
    }

    if *last == GITKEEP_FILE || arena.child(current, last).is_some() {
        return;
    }

    let kind = if is_dir {
        NodeKind::empty_dir()
    } else {
        NodeKind::File {
            content: None,
            binary: false,
        }
    };
    let _ = arena.attach(current, last, kind);
}
