//! simbox-core: Remote-backed workspace for simbox
//!
//! A local view of a workspace whose files live in a remote object store and
//! whose shells run on a remote PTY host:
//!
//! - [`vfs::VirtualFileTree`] caches files and directories, reading through
//!   and writing through to the store
//! - [`sync::SyncQueue`] retries writes that could not be persisted
//! - [`terminal::TerminalRegistry`] manages websocket terminal sessions and
//!   runs headless commands on them
//! - [`context::AppContext`] wires everything together

pub mod config;
pub mod context;
pub mod domains;
pub mod remote;
pub mod sync;
pub mod terminal;
pub mod vfs;

pub use config::{AppConfig, ConfigLoader};
pub use context::AppContext;
pub use domains::{DomainResolver, Endpoints};
pub use remote::RemoteStoreClient;
pub use sync::{PendingSyncEntry, SyncEvent, SyncOperation, SyncQueue};
pub use terminal::{CommandOutput, TerminalRegistry, TerminalSession};
pub use vfs::{EntryType, VirtualFileTree};
