//! Mapping from agent identity to workspace root.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::{GatewayError, Result};

/// Validated agent identifier.
///
/// Agent ids become a directory name under the workspace base directory, so
/// only a conservative character set is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentId(String);

impl AgentId {
    /// Maximum accepted length.
    pub const MAX_LEN: usize = 64;

    /// Parse an agent id.
    ///
    /// Accepts ASCII alphanumerics, `-`, `_` and `.`; rejects `.` and `..`.
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= Self::MAX_LEN
            && raw != "."
            && raw != ".."
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));

        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(GatewayError::Forbidden(format!("invalid agent id {raw:?}")))
        }
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Maps an agent to the absolute root of its workspace.
#[async_trait]
pub trait WorkspaceLocator: Send + Sync {
    /// Return the workspace root for `agent`, creating it if needed.
    async fn locate(&self, agent: &AgentId) -> Result<PathBuf>;
}

/// Locator that keeps one directory per agent under a common base directory.
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    base_dir: PathBuf,
}

impl DirectoryLocator {
    /// Create a locator rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl WorkspaceLocator for DirectoryLocator {
    async fn locate(&self, agent: &AgentId) -> Result<PathBuf> {
        let root = self.base_dir.join(agent.as_str());

        fs::create_dir_all(&root)
            .await
            .map_err(|e| GatewayError::io("create workspace", &root, e))?;

        let root = fs::canonicalize(&root)
            .await
            .map_err(|e| GatewayError::io("canonicalize", &root, e))?;

        debug!(agent = %agent, root = %root.display(), "Located workspace");
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_agent_id_valid() {
        for raw in ["main", "agent-1", "research_bot", "v1.2", "A"] {
            assert_eq!(AgentId::parse(raw).unwrap().as_str(), raw);
        }
    }

    #[test]
    fn test_agent_id_invalid() {
        let too_long = "a".repeat(AgentId::MAX_LEN + 1);
        for raw in ["", ".", "..", "../main", "a/b", "a b", "ägent", too_long.as_str()] {
            assert!(
                matches!(AgentId::parse(raw), Err(GatewayError::Forbidden(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_agent_id_display() {
        let agent = AgentId::parse("main").unwrap();
        assert_eq!(agent.to_string(), "main");
    }

    #[tokio::test]
    async fn test_locate_creates_root() {
        let temp_dir = TempDir::new().unwrap();
        let locator = DirectoryLocator::new(temp_dir.path().join("workspaces"));
        let agent = AgentId::parse("main").unwrap();

        let root = locator.locate(&agent).await.unwrap();

        assert!(root.is_dir());
        assert!(root.is_absolute());
        assert!(root.ends_with("workspaces/main"));
    }

    #[tokio::test]
    async fn test_locate_separates_agents() {
        let temp_dir = TempDir::new().unwrap();
        let locator = DirectoryLocator::new(temp_dir.path());

        let main = locator.locate(&AgentId::parse("main").unwrap()).await.unwrap();
        let other = locator.locate(&AgentId::parse("other").unwrap()).await.unwrap();

        assert_ne!(main, other);
        assert!(!other.starts_with(&main));
    }
}
