//! Per-agent workspace operations.
//!
//! This module provides the file operations exposed over HTTP:
//! - Directory listing with hidden-entry filtering
//! - Streaming downloads and whole-file text reads and writes
//! - Idempotent, recursive deletes
//! - Streaming multipart upload ingest
//!
//! # Security
//!
//! Every operation resolves its target through [`PathResolver`], which
//! rejects lexical escapes and symlinks leading outside the workspace root,
//! before any other filesystem access.

pub mod browser;
pub mod ingest;
pub mod locator;
pub mod resolver;
pub mod transfer;

use std::path::{Path, PathBuf};

pub use locator::{AgentId, DirectoryLocator, WorkspaceLocator};
pub use resolver::PathResolver;
pub use transfer::{Download, DOWNLOAD_CHUNK_SIZE};

use crate::error::Result;

/// A located workspace for one agent, valid for a single request.
#[derive(Debug, Clone)]
pub struct Workspace {
    agent: AgentId,
    resolver: PathResolver,
}

impl Workspace {
    /// Create a workspace handle for `agent` rooted at `root`.
    pub fn new(agent: AgentId, root: impl Into<PathBuf>) -> Self {
        Self {
            agent,
            resolver: PathResolver::new(root),
        }
    }

    /// The agent owning this workspace.
    pub fn agent(&self) -> &AgentId {
        &self.agent
    }

    /// The workspace root.
    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    /// Resolve a request path and confirm it is confined to the root.
    pub async fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let path = self.resolver.resolve(relative)?;
        self.resolver.confine(&path).await?;
        Ok(path)
    }

    /// Root-relative form of a resolved path, using `/` separators.
    fn relative_name(&self, path: &Path) -> String {
        path.strip_prefix(self.root())
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}
