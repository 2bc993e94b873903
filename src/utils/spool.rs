// On-disk spooling of uploaded images

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::models::ImageInput;
use crate::types::{AppError, AppResult};

/// Temporary copy of an uploaded image. The file is removed when the spool is
/// dropped, whether or not it was read back.
pub struct ImageSpool {
    // Declared before `file` so the handle closes before the path is unlinked
    writer: tokio::fs::File,
    file: NamedTempFile,
    written: usize,
    max_bytes: usize,
}

impl ImageSpool {
    pub async fn create(dir: &Path, max_bytes: usize) -> AppResult<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| AppError::Internal(format!("Cannot prepare upload directory: {}", e)))?;

        let dir: PathBuf = dir.to_path_buf();
        let (file, handle) = tokio::task::spawn_blocking(move || {
            let file = tempfile::Builder::new().prefix("image-").tempfile_in(&dir)?;
            let handle = file.reopen()?;
            Ok::<_, std::io::Error>((file, handle))
        })
        .await
        .map_err(|e| AppError::Internal(format!("Spool task failed: {}", e)))?
        .map_err(|e| AppError::Internal(format!("Cannot create spool file: {}", e)))?;

        debug!(path = %file.path().display(), "Spooling upload");
        Ok(Self {
            writer: tokio::fs::File::from_std(handle),
            file,
            written: 0,
            max_bytes,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn len(&self) -> usize {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> AppResult<()> {
        if self.written + chunk.len() > self.max_bytes {
            return Err(AppError::validation(format!(
                "File too large: limit is {} bytes",
                self.max_bytes
            )));
        }
        self.writer
            .write_all(chunk)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to spool upload: {}", e)))?;
        self.written += chunk.len();
        Ok(())
    }

    /// Read the spooled bytes back; the file is deleted on return
    pub async fn finish(mut self, mime_type: String, original_name: Option<String>) -> AppResult<ImageInput> {
        self.writer
            .flush()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to spool upload: {}", e)))?;
        let buffer = tokio::fs::read(self.file.path())
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read spooled upload: {}", e)))?;

        Ok(ImageInput {
            bytes: Bytes::from(buffer),
            mime_type,
            original_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_spool_round_trip_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut spool = ImageSpool::create(dir.path(), 1024).await.unwrap();
        spool.write_chunk(b"\xFF\xD8\xFF").await.unwrap();
        spool.write_chunk(b"rest").await.unwrap();
        assert_eq!(spool.len(), 7);
        assert!(spool.path().exists());
        assert_eq!(entries(dir.path()), 1);

        let image = spool.finish("image/jpeg".to_string(), Some("cat.jpg".to_string())).await.unwrap();
        assert_eq!(&image.bytes[..], b"\xFF\xD8\xFFrest");
        assert_eq!(image.original_name.as_deref(), Some("cat.jpg"));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let mut spool = ImageSpool::create(dir.path(), 8).await.unwrap();
        spool.write_chunk(b"12345").await.unwrap();

        let err = spool.write_chunk(b"6789").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref msg) if msg.starts_with("File too large")));

        drop(spool);
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_creates_missing_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("uploads");
        let spool = ImageSpool::create(&nested, 8).await.unwrap();
        assert!(spool.is_empty());
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_many_chunks_arrive_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut spool = ImageSpool::create(dir.path(), 64 * 1024).await.unwrap();
        let mut expected = Vec::new();
        for i in 0..64u8 {
            let chunk = vec![i; 1000];
            spool.write_chunk(&chunk).await.unwrap();
            expected.extend_from_slice(&chunk);
        }

        let image = spool.finish("image/png".to_string(), None).await.unwrap();
        assert_eq!(&image.bytes[..], expected.as_slice());
        assert_eq!(entries(dir.path()), 0);
    }
}
