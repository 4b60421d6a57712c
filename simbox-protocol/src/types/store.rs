//! Object store API bodies

use serde::{Deserialize, Serialize};

/// Placeholder file uploaded to materialize an empty directory remotely
pub const GITKEEP_FILE: &str = ".gitkeep";

/// `POST /oss/upload` request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    /// Object key, relative to the caller's namespace
    pub key: String,
    /// File content; base64 text when `is_binary_encoded` is set
    pub content: String,
    #[serde(default, alias = "isBase64")]
    pub is_binary_encoded: bool,
}

impl UploadRequest {
    pub fn new(key: impl Into<String>, content: impl Into<String>, is_binary_encoded: bool) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
            is_binary_encoded,
        }
    }

    /// Upload that materializes the directory `path` as `{path}/.gitkeep`
    pub fn directory_marker(path: &str) -> Self {
        let key = if path.is_empty() {
            GITKEEP_FILE.to_string()
        } else {
            format!("{}/{}", path.trim_end_matches('/'), GITKEEP_FILE)
        };
        Self::new(key, "", false)
    }
}

/// Generic `{success, message}` acknowledgement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// `GET /oss/tree` response body
///
/// `tree` is flat: every object key under the prefix, directories carrying
/// a trailing `/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub tree: Vec<String>,
}
