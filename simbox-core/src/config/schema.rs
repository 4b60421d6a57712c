//! Configuration schema structs

use serde::{Deserialize, Serialize};

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub remote: RemoteConfig,
    pub workspace: WorkspaceConfig,
    pub sync: SyncConfig,
    pub terminal: TerminalConfig,
    pub domains: DomainsConfig,
}

/// Object store and domain API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL; requests go to `{api_base_url}/api/{namespace}/...`
    pub api_base_url: String,
    /// Storage namespace prefix (usually the user id)
    pub namespace: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080".into(),
            namespace: "default".into(),
            request_timeout_secs: 30,
        }
    }
}

/// Workspace layout inside the remote container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Absolute working-directory root that cache paths are relative to
    pub workdir: String,
    /// Sent as INPUT once a terminal becomes interactive
    pub bootstrap_command: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            workdir: "/home/project".into(),
            bootstrap_command: "cd project\n".into(),
        }
    }
}

/// Pending-write reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between drains of the pending list
    pub interval_secs: u64,
    /// Failed attempts before an entry is abandoned
    pub max_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            max_retries: 3,
        }
    }
}

/// Terminal transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// WebSocket sub-protocol requested on connect
    pub subprotocol: String,
    /// Initial columns declared in the handshake
    pub columns: u16,
    /// Initial rows declared in the handshake
    pub rows: u16,
    /// Budget for a marker-terminated command
    pub exec_timeout_secs: u64,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            subprotocol: simbox_protocol::TTY_SUBPROTOCOL.into(),
            columns: 80,
            rows: 40,
            exec_timeout_secs: 60,
        }
    }
}

/// Domain discovery at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainsConfig {
    pub retry_interval_secs: u64,
    /// Give up after this many attempts; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for DomainsConfig {
    fn default() -> Self {
        Self {
            retry_interval_secs: 3,
            max_attempts: None,
        }
    }
}
