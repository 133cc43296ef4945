//! Directory listing inside a workspace.

use std::fs::Metadata;
use std::io;

use chrono::{DateTime, Utc};
use protocol::FileEntry;
use tokio::fs;
use tracing::debug;

use super::Workspace;
use crate::error::{GatewayError, Result};

impl Workspace {
    /// List the entries of a directory.
    ///
    /// Hidden entries (leading `.`) are omitted. Directories come first,
    /// then files, each group ordered by name. A missing workspace root is
    /// created and listed as empty; any other missing directory, or a target
    /// that is a file, is `NotFound`.
    pub async fn list(&self, relative: &str) -> Result<Vec<FileEntry>> {
        let dir = self.resolve(relative).await?;

        match fs::metadata(&dir).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Err(GatewayError::NotFound(dir)),
            Err(e) if e.kind() == io::ErrorKind::NotFound && dir == self.root() => {
                fs::create_dir_all(&dir)
                    .await
                    .map_err(|e| GatewayError::io("create workspace", &dir, e))?;
                debug!(agent = %self.agent(), root = %dir.display(), "Created workspace root");
                return Ok(Vec::new());
            }
            Err(e) => return Err(GatewayError::from_io("stat", dir, e)),
        }

        let mut reader = fs::read_dir(&dir)
            .await
            .map_err(|e| GatewayError::from_io("read directory", &dir, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| GatewayError::io("read directory", &dir, e))?
        {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    debug!(name = ?raw, "Skipping entry with non UTF-8 name");
                    continue;
                }
            };

            if name.starts_with('.') {
                continue;
            }

            // Follows symlinks, so dangling links fall out here.
            let metadata = match fs::metadata(entry.path()).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            entries.push(file_entry(name, &metadata));
        }

        sort_entries(&mut entries);
        Ok(entries)
    }
}

/// Build a listing entry from metadata.
fn file_entry(name: String, metadata: &Metadata) -> FileEntry {
    let is_directory = metadata.is_dir();
    let mtime = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_default();

    FileEntry {
        name,
        size: if is_directory { 0 } else { metadata.len() },
        mtime,
        is_directory,
    }
}

/// Directories first, then by name (byte-wise, case-sensitive).
fn sort_entries(entries: &mut [FileEntry]) {
    entries.sort_by(|a, b| {
        b.is_directory
            .cmp(&a.is_directory)
            .then_with(|| a.name.cmp(&b.name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::AgentId;
    use std::os::unix::fs::symlink;
    use std::path::Path;
    use tempfile::TempDir;

    fn workspace(root: &Path) -> Workspace {
        Workspace::new(AgentId::parse("main").unwrap(), root)
    }

    fn create_test_structure(dir: &Path) {
        std::fs::create_dir_all(dir.join("subdir")).unwrap();
        std::fs::create_dir_all(dir.join(".hidden_dir")).unwrap();

        std::fs::write(dir.join("file.txt"), "Hello").unwrap();
        std::fs::write(dir.join("subdir/nested.txt"), "Nested").unwrap();
        std::fs::write(dir.join(".hidden"), "Hidden").unwrap();
    }

    fn names(entries: &[FileEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_list_root() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());

        let entries = workspace(temp_dir.path()).list("").await.unwrap();

        assert_eq!(names(&entries), vec!["subdir", "file.txt"]);
        assert!(entries[0].is_directory);
        assert_eq!(entries[0].size, 0);
        assert!(!entries[1].is_directory);
        assert_eq!(entries[1].size, 5);
        assert!(entries[1].mtime.timestamp() > 0);
    }

    #[tokio::test]
    async fn test_list_excludes_hidden() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());

        let entries = workspace(temp_dir.path()).list("").await.unwrap();

        assert!(!names(&entries).iter().any(|n| n.starts_with('.')));
    }

    #[tokio::test]
    async fn test_list_nested() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());

        let entries = workspace(temp_dir.path()).list("subdir").await.unwrap();

        assert_eq!(names(&entries), vec!["nested.txt"]);
    }

    #[tokio::test]
    async fn test_directory_sorting() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("zebra.txt"), "z").unwrap();
        std::fs::write(temp_dir.path().join("apple.txt"), "a").unwrap();
        std::fs::write(temp_dir.path().join("Zulu.txt"), "Z").unwrap();
        std::fs::create_dir_all(temp_dir.path().join("beta_dir")).unwrap();
        std::fs::create_dir_all(temp_dir.path().join("alpha_dir")).unwrap();

        let entries = workspace(temp_dir.path()).list("").await.unwrap();

        assert_eq!(
            names(&entries),
            vec!["alpha_dir", "beta_dir", "Zulu.txt", "apple.txt", "zebra.txt"]
        );
    }

    #[tokio::test]
    async fn test_missing_root_created_lazily() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("fresh");

        let entries = workspace(&root).list("").await.unwrap();

        assert!(entries.is_empty());
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn test_missing_subdir_not_found() {
        let temp_dir = TempDir::new().unwrap();

        let result = workspace(temp_dir.path()).list("nope").await;

        assert!(matches!(result, Err(GatewayError::NotFound(_))));
        assert!(!temp_dir.path().join("nope").exists());
    }

    #[tokio::test]
    async fn test_file_target_not_found() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("file.txt"), "Hello").unwrap();

        let result = workspace(temp_dir.path()).list("file.txt").await;

        assert!(matches!(result, Err(GatewayError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_traversal_forbidden() {
        let temp_dir = TempDir::new().unwrap();

        let result = workspace(temp_dir.path()).list("../..").await;

        assert!(matches!(result, Err(GatewayError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_symlinks_report_target() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("file.txt"), "Hello World").unwrap();
        symlink(temp_dir.path().join("file.txt"), temp_dir.path().join("link.txt")).unwrap();
        symlink(temp_dir.path().join("missing"), temp_dir.path().join("dangling")).unwrap();

        let entries = workspace(temp_dir.path()).list("").await.unwrap();

        assert_eq!(names(&entries), vec!["file.txt", "link.txt"]);
        assert_eq!(entries[1].size, 11);
    }

    #[test]
    fn test_sort_entries() {
        let entry = |name: &str, is_directory: bool| FileEntry {
            name: name.to_string(),
            size: 0,
            mtime: DateTime::<Utc>::default(),
            is_directory,
        };
        let mut entries = vec![
            entry("b.txt", false),
            entry("z", true),
            entry("a.txt", false),
            entry("m", true),
        ];

        sort_entries(&mut entries);

        assert_eq!(names(&entries), vec!["m", "z", "a.txt", "b.txt"]);
    }
}
