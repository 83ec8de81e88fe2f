//! Write destination for a response body.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use super::error::DownloadError;

/// Where streamed bytes go while a transfer is running.
///
/// `Memory` holds the whole body and only touches the destination once the
/// stream has completed, so an interrupted buffered transfer leaves no file.
/// `File` writes through to the destination as chunks arrive.
#[derive(Debug)]
pub(crate) enum Sink {
    Memory { path: PathBuf, buffer: Vec<u8> },
    File { path: PathBuf, writer: BufWriter<File> },
}

impl Sink {
    /// Opens a sink for `path`. Direct mode creates (or truncates) the file
    /// immediately.
    pub(crate) async fn open(path: &Path, buffered: bool) -> Result<Self, DownloadError> {
        if buffered {
            return Ok(Self::Memory {
                path: path.to_path_buf(),
                buffer: Vec::new(),
            });
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }
        let file = File::create(path)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        Ok(Self::File {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub(crate) async fn write(&mut self, chunk: &[u8]) -> Result<(), DownloadError> {
        match self {
            Self::Memory { buffer, .. } => {
                buffer.extend_from_slice(chunk);
                Ok(())
            }
            Self::File { path, writer } => writer
                .write_all(chunk)
                .await
                .map_err(|e| DownloadError::io(path.as_path(), e)),
        }
    }

    /// Persists everything written so far and closes the sink.
    ///
    /// A memory sink writes its whole buffer to the destination in one pass.
    pub(crate) async fn commit(self) -> Result<(), DownloadError> {
        match self {
            Self::Memory { path, buffer } => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| DownloadError::io(parent, e))?;
                }
                tokio::fs::write(&path, &buffer)
                    .await
                    .map_err(|e| DownloadError::io(&path, e))
            }
            Self::File { path, mut writer } => {
                writer
                    .flush()
                    .await
                    .map_err(|e| DownloadError::io(path.as_path(), e))?;
                writer
                    .into_inner()
                    .sync_all()
                    .await
                    .map_err(|e| DownloadError::io(path, e))
            }
        }
    }

    /// Closes the sink after a cancel or failure.
    ///
    /// A memory sink drops its buffer without touching disk. A file sink
    /// flushes, so the partial file holds exactly the bytes received.
    pub(crate) async fn abandon(self) {
        match self {
            Self::Memory { buffer, .. } => drop(buffer),
            Self::File { path, mut writer } => {
                if let Err(error) = writer.flush().await {
                    tracing::warn!(path = %path.display(), %error, "failed to flush partial download");
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_sink_creates_nothing_until_commit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("buffered.bin");

        let mut sink = Sink::open(&path, true).await.unwrap();
        sink.write(b"hello ").await.unwrap();
        sink.write(b"world").await.unwrap();
        assert!(!path.exists());

        sink.commit().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_abandoned_memory_sink_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lost.bin");

        let mut sink = Sink::open(&path, true).await.unwrap();
        sink.write(&[1u8; 512]).await.unwrap();
        sink.abandon().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_abandoned_file_sink_keeps_received_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.bin");

        let mut sink = Sink::open(&path, false).await.unwrap();
        assert!(path.exists());
        sink.write(&[7u8; 300]).await.unwrap();
        sink.write(&[8u8; 200]).await.unwrap();
        sink.abandon().await;

        let written = std::fs::read(&path).unwrap();
        assert_eq!(written.len(), 500);
        assert!(written[..300].iter().all(|b| *b == 7));
    }

    #[tokio::test]
    async fn test_file_sink_truncates_existing_destination() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("existing.bin");
        std::fs::write(&path, vec![0u8; 4096]).unwrap();

        let mut sink = Sink::open(&path, false).await.unwrap();
        sink.write(b"new").await.unwrap();
        sink.commit().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_sink_creates_missing_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/file.bin");

        let mut sink = Sink::open(&path, false).await.unwrap();
        sink.write(b"x").await.unwrap();
        sink.commit().await.unwrap();
        assert!(path.exists());
    }
}
