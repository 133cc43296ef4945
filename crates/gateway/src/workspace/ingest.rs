//! Multipart upload ingest.
//!
//! Request bodies are decoded incrementally: each chunk is fed to the
//! [`MultipartDecoder`] and every file part is streamed into a hidden
//! temporary file next to its destination. Temp files are renamed into place
//! only once the closing delimiter has been decoded, so a request that fails
//! at any part leaves no new files behind. Nothing is buffered beyond the
//! decoder's delimiter lookahead.

use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use protocol::{MultipartDecoder, MultipartEvent, PartHeaders};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Workspace;
use crate::error::{GatewayError, Result};

/// Destination of the part currently being decoded.
enum Part {
    /// Form field without a file name; content is discarded.
    Skipped,
    /// File part being written to disk.
    File(PartSink),
}

/// Temp file backing an in-flight file part.
///
/// Dropping an uncommitted sink removes its temp file, which covers decode
/// errors, size cap violations and client disconnects alike.
struct PartSink {
    /// Open while the part is still receiving data.
    file: Option<File>,
    temp_path: PathBuf,
    destination: PathBuf,
    committed: bool,
}

impl PartSink {
    async fn create(destination: PathBuf) -> Result<Self> {
        let parent = destination
            .parent()
            .ok_or_else(|| GatewayError::BadRequest("upload target has no parent".to_string()))?;

        fs::create_dir_all(parent)
            .await
            .map_err(|e| GatewayError::io("create directory", parent, e))?;

        let temp_path = parent.join(format!(".upload-{}.tmp", Uuid::new_v4()));
        let file = File::create(&temp_path)
            .await
            .map_err(|e| GatewayError::io("create", &temp_path, e))?;

        Ok(Self {
            file: Some(file),
            temp_path,
            destination,
            committed: false,
        })
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(GatewayError::BadRequest("data after end of part".to_string()));
        };
        file.write_all(data)
            .await
            .map_err(|e| GatewayError::io("write", &self.temp_path, e))
    }

    /// Flush and close the temp file once the part has ended.
    async fn finish(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| GatewayError::io("flush", &self.temp_path, e))?;
        }
        Ok(())
    }

    /// Move the finished temp file onto its destination.
    async fn commit(mut self) -> Result<PathBuf> {
        self.finish().await?;

        fs::rename(&self.temp_path, &self.destination)
            .await
            .map_err(|e| GatewayError::io("rename", &self.destination, e))?;

        self.committed = true;
        Ok(self.destination.clone())
    }
}

impl Drop for PartSink {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.temp_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.temp_path.display(), error = %e, "Failed to remove temp file");
            }
        }
    }
}

impl Workspace {
    /// Stream a multipart body into the directory `relative_dir`.
    ///
    /// Returns the root-relative names of the files written, in body order.
    /// The whole body may not exceed `limit` bytes.
    ///
    /// Files are committed together after the body decodes cleanly. On any
    /// error every temp file of the request is removed and no destination is
    /// touched.
    pub async fn ingest<S, E>(
        &self,
        relative_dir: &str,
        boundary: &str,
        body: S,
        limit: u64,
    ) -> Result<Vec<String>>
    where
        S: Stream<Item = std::result::Result<Bytes, E>>,
        E: fmt::Display,
    {
        let dir = self.resolve(relative_dir).await?;

        let mut decoder = MultipartDecoder::new(boundary);
        let mut body = std::pin::pin!(body);
        let mut received: u64 = 0;
        let mut current: Option<Part> = None;
        let mut finished: Vec<PartSink> = Vec::new();

        loop {
            while let Some(event) = decoder.next_event()? {
                match event {
                    MultipartEvent::PartStart(headers) => {
                        current = Some(self.open_part(&dir, headers).await?);
                    }
                    MultipartEvent::Data(data) => {
                        if let Some(Part::File(sink)) = current.as_mut() {
                            sink.write(&data).await?;
                        }
                    }
                    MultipartEvent::PartEnd => {
                        if let Some(Part::File(mut sink)) = current.take() {
                            sink.finish().await?;
                            finished.push(sink);
                        }
                    }
                }
            }

            if decoder.is_finished() {
                break;
            }

            match body.next().await {
                Some(Ok(chunk)) => {
                    received += chunk.len() as u64;
                    if received > limit {
                        return Err(GatewayError::PayloadTooLarge { limit });
                    }
                    decoder.feed(&chunk);
                }
                Some(Err(e)) => {
                    return Err(GatewayError::BadRequest(format!(
                        "failed to read request body: {e}"
                    )));
                }
                None => {
                    decoder.finish()?;
                    break;
                }
            }
        }

        let mut written = Vec::with_capacity(finished.len());
        for sink in finished {
            let path = sink.commit().await?;
            written.push(self.relative_name(&path));
        }

        info!(
            agent = %self.agent(),
            dir = %dir.display(),
            files = written.len(),
            bytes = received,
            "Upload complete"
        );
        Ok(written)
    }

    /// Prepare the destination for a new part.
    async fn open_part(&self, dir: &Path, headers: PartHeaders) -> Result<Part> {
        let Some(file_name) = headers.file_name else {
            debug!(field = ?headers.name, "Skipping multipart field without file name");
            return Ok(Part::Skipped);
        };

        let destination = self.resolver.resolve_child(dir, &file_name)?;
        if destination == dir || destination == self.root() {
            return Err(GatewayError::BadRequest(format!(
                "invalid upload file name {file_name:?}"
            )));
        }
        self.resolver.confine(&destination).await?;

        Ok(Part::File(PartSink::create(destination).await?))
    }
}
