// Artifact transfer and cleanup
//
// An artifact is the transient file a finished transfer leaves behind. It
// is streamed to the caller exactly once and must not survive the
// response: the file is bound to a guard that removes it when the body
// stream is dropped, which covers normal completion, caller disconnect,
// and mid-stream I/O errors alike. Removal failures are logged and
// swallowed; they are never surfaced to the caller.

use std::io;
use std::path::{Path, PathBuf};

use futures::{Stream, StreamExt};
use tokio::fs::File;
use tokio_util::bytes::Bytes;
use tokio_util::io::ReaderStream;
use tracing::warn;

/// Removes the wrapped file when dropped, wherever that happens.
struct RemoveOnDrop {
    path: PathBuf,
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), %err, "failed to remove artifact");
            }
        }
    }
}

/// A downloaded file together with the name it should carry as an
/// attachment. Exclusively owned until converted into a stream.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
    download_name: String,
}

impl Artifact {
    pub fn new(path: PathBuf, download_name: String) -> Self {
        Self {
            path,
            download_name,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attachment filename, already sanitized by the orchestrator.
    pub fn download_name(&self) -> &str {
        &self.download_name
    }

    /// Open the artifact for streaming. The underlying file is deleted as
    /// soon as the returned stream is dropped; if opening fails the file
    /// is removed immediately.
    pub async fn open_stream(
        self,
    ) -> io::Result<impl Stream<Item = io::Result<Bytes>> + Send + 'static> {
        let guard = RemoveOnDrop {
            path: self.path.clone(),
        };
        let file = File::open(&self.path).await?;
        Ok(ReaderStream::new(file).map(move |chunk| {
            // the guard rides along with the stream and fires on drop
            let _keep_alive = &guard;
            chunk
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact_with_content(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> Artifact {
        let path = dir.path().join(name);
        std::fs::write(&path, content).expect("write artifact");
        Artifact::new(path, name.to_string())
    }

    #[tokio::test]
    async fn test_file_removed_after_full_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let artifact = artifact_with_content(&dir, "clip.mp4", b"some video bytes");
        let path = artifact.path().to_path_buf();

        let mut stream = artifact.open_stream().await.expect("open stream");
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.expect("chunk"));
        }
        assert_eq!(collected, b"some video bytes");

        assert!(path.exists());
        drop(stream);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_file_removed_when_stream_dropped_early() {
        let dir = tempfile::tempdir().expect("tempdir");
        let artifact = artifact_with_content(&dir, "clip.mp3", b"abandoned mid-transfer");
        let path = artifact.path().to_path_buf();

        let stream = artifact.open_stream().await.expect("open stream");
        drop(stream);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_missing_file_errors_without_panicking() {
        let dir = tempfile::tempdir().expect("tempdir");
        let artifact = Artifact::new(dir.path().join("gone.mp4"), "gone.mp4".to_string());
        assert!(artifact.open_stream().await.is_err());
    }
}
