//! File content transfer: streaming downloads, text reads and writes, deletes.
//!
//! Text writes go through a hidden temporary file in the target directory
//! and an atomic rename, so readers never observe a half-written file and
//! concurrent writers to one path resolve to exactly one of their contents.

use std::io;

use tokio::fs::{self, File};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use uuid::Uuid;

use super::Workspace;
use crate::error::{GatewayError, Result};

/// Chunk size for streamed downloads (64KB).
pub const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// An opened file ready to be streamed to the client.
#[derive(Debug)]
pub struct Download {
    /// Base name of the file.
    pub file_name: String,
    /// Size in bytes at open time.
    pub len: u64,
    /// Chunked reader over the file contents.
    pub stream: ReaderStream<File>,
}

impl Workspace {
    /// Open a file for streaming download.
    pub async fn download(&self, relative: &str) -> Result<Download> {
        let path = self.resolve(relative).await?;

        let file = File::open(&path)
            .await
            .map_err(|e| GatewayError::from_io("open", &path, e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| GatewayError::io("stat", &path, e))?;

        if metadata.is_dir() {
            return Err(GatewayError::NotFound(path));
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string());

        debug!(agent = %self.agent(), path = %path.display(), len = metadata.len(), "Starting download");

        Ok(Download {
            file_name,
            len: metadata.len(),
            stream: ReaderStream::with_capacity(file, DOWNLOAD_CHUNK_SIZE),
        })
    }

    /// Read a whole file as UTF-8 text.
    pub async fn read_text(&self, relative: &str) -> Result<String> {
        let path = self.resolve(relative).await?;

        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| GatewayError::from_io("stat", &path, e))?;
        if metadata.is_dir() {
            return Err(GatewayError::NotFound(path));
        }

        let bytes = fs::read(&path)
            .await
            .map_err(|e| GatewayError::from_io("read", &path, e))?;

        String::from_utf8(bytes).map_err(|e| {
            GatewayError::io("decode", &path, io::Error::new(io::ErrorKind::InvalidData, e))
        })
    }

    /// Replace a file's contents with `content`, which must be UTF-8.
    ///
    /// Creates the file if needed; never creates parent directories.
    pub async fn write_text(&self, relative: &str, content: &[u8]) -> Result<()> {
        let path = self.resolve(relative).await?;

        if let Err(e) = std::str::from_utf8(content) {
            return Err(GatewayError::BadRequest(format!("body is not valid UTF-8: {e}")));
        }

        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_dir() => {
                return Err(GatewayError::io(
                    "write",
                    &path,
                    io::Error::other("target is a directory"),
                ));
            }
            _ => {}
        }

        let parent = path.parent().unwrap_or(self.root());
        let temp_path = parent.join(format!(".write-{}.tmp", Uuid::new_v4()));

        fs::write(&temp_path, content)
            .await
            .map_err(|e| GatewayError::io("write", &path, e))?;

        if let Err(e) = fs::rename(&temp_path, &path).await {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                warn!(path = %temp_path.display(), error = %cleanup, "Failed to remove temp file");
            }
            return Err(GatewayError::io("rename", &path, e));
        }

        debug!(agent = %self.agent(), path = %path.display(), len = content.len(), "Wrote text file");
        Ok(())
    }

    /// Delete a file or directory tree. Missing targets succeed.
    pub async fn delete(&self, relative: &str) -> Result<()> {
        let path = self.resolve(relative).await?;

        if path == self.root() {
            return Err(GatewayError::Forbidden(
                "refusing to delete the workspace root".to_string(),
            ));
        }

        let metadata = match fs::symlink_metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Delete target already absent");
                return Ok(());
            }
            Err(e) => return Err(GatewayError::io("stat", &path, e)),
        };

        let result = if metadata.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };

        match result {
            Ok(()) => {
                debug!(agent = %self.agent(), path = %path.display(), "Deleted");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GatewayError::io("delete", &path, e)),
        }
    }
}
