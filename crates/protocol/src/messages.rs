//! Wire types for the workspace HTTP surface.
//!
//! These are the JSON bodies and query parameters exchanged between the
//! gateway and its clients. Field names follow the camelCase convention the
//! browser client expects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the agent used when a request carries no `agentId`.
pub const DEFAULT_AGENT_ID: &str = "main";

// ============================================================================
// Request Types
// ============================================================================

/// Query parameters accepted by every workspace endpoint.
///
/// `token` and `username` are the query-string fallback for clients that
/// cannot set an `Authorization` header (direct-link downloads).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceQuery {
    /// Relative path for listing, or target directory for uploads.
    pub path: Option<String>,
    /// Access token.
    pub token: Option<String>,
    /// Username paired with the token.
    pub username: Option<String>,
    /// Agent whose workspace is addressed.
    pub agent_id: Option<String>,
}

// ============================================================================
// Response Types
// ============================================================================

/// A single file or directory entry in a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Entry name (not full path).
    pub name: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time.
    pub mtime: DateTime<Utc>,
    /// Whether the entry is a directory.
    pub is_directory: bool,
}

/// Success acknowledgement for mutating operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OkResponse {
    /// Always `true`.
    pub ok: bool,
    /// Workspace-relative names written by an upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
}

impl OkResponse {
    /// Plain acknowledgement.
    pub fn ok() -> Self {
        Self {
            ok: true,
            files: None,
        }
    }

    /// Acknowledgement listing the files an upload produced.
    pub fn with_files(files: Vec<String>) -> Self {
        Self {
            ok: true,
            files: Some(files),
        }
    }
}

/// Error body returned for JSON failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Caller-safe error description.
    pub error: String,
}

impl ErrorBody {
    /// Create an error body.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
