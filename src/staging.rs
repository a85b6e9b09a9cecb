//! Local staging for uploaded files.
//!
//! An incoming image is written to a staging directory before any cloud
//! transfer, so the upload step never has to re-read the request stream. The
//! staged file's name doubles as the object name in the blob store: a UUIDv4
//! plus the original extension, collision-free for concurrent uploads.
//!
//! Cleanup must happen on every exit path, including upload failure, so the
//! staged path is held behind a scope guard that unlinks it on drop.

use crate::errors::{Error, Result};
use anyhow::Context;
use scopeguard::ScopeGuard;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// The staging area on the local filesystem.
#[derive(Debug, Clone)]
pub struct Staging {
    dir: PathBuf,
}

fn remove_staged(path: PathBuf) {
    if let Err(e) = std::fs::remove_file(&path) {
        // The file may already be gone; anything else is worth a warning
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove staged upload");
        }
    }
}

impl Staging {
    /// Open the staging area, creating the directory if needed.
    pub async fn init(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating staging directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// Write an upload to the staging area under a freshly generated name.
    pub async fn stage(&self, original_name: &str, data: &[u8]) -> Result<StagedUpload> {
        let object_name = generate_object_name(original_name);
        let content_type = mime_guess::from_path(original_name).first_or_octet_stream().to_string();
        let path = self.dir.join(&object_name);

        tokio::fs::write(&path, data)
            .await
            .map_err(|e| Error::Other(anyhow::Error::new(e).context("writing staged upload")))?;

        tracing::debug!(object = %object_name, path = %path.display(), "Staged upload");

        Ok(StagedUpload {
            object_name,
            content_type,
            path: scopeguard::guard(path, remove_staged as fn(PathBuf)),
        })
    }
}

/// A file sitting in the staging area. Removed from disk when dropped.
pub struct StagedUpload {
    object_name: String,
    content_type: String,
    path: ScopeGuard<PathBuf, fn(PathBuf)>,
}

impl StagedUpload {
    /// The generated name this upload will be stored under in the blob store
    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    /// Content type guessed from the original filename
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Read the staged bytes back for transfer
    pub async fn read(&self) -> Result<Vec<u8>> {
        tokio::fs::read(&*self.path)
            .await
            .map_err(|e| Error::Other(anyhow::Error::new(e).context("reading staged upload")))
    }
}

fn generate_object_name(original_name: &str) -> String {
    let token = Uuid::new_v4();
    match Path::new(original_name).extension() {
        Some(ext) if !ext.is_empty() => format!("{}.{}", token, ext.to_string_lossy().to_lowercase()),
        _ => token.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_staging() -> (tempfile::TempDir, Staging) {
        let dir = tempfile::tempdir().unwrap();
        let staging = Staging::init(dir.path()).await.unwrap();
        (dir, staging)
    }

    #[tokio::test]
    async fn stage_writes_file_and_keeps_extension() {
        let (_dir, staging) = test_staging().await;

        let staged = staging.stage("oak.PNG", b"image bytes").await.unwrap();
        assert!(staged.object_name().ends_with(".png"));
        assert_eq!(staged.read().await.unwrap(), b"image bytes");
        assert_eq!(staged.content_type(), "image/png");
    }

    #[tokio::test]
    async fn staged_file_is_removed_on_drop() {
        let (dir, staging) = test_staging().await;

        let staged = staging.stage("oak.png", b"image bytes").await.unwrap();
        let path = dir.path().join(staged.object_name());
        assert!(path.exists());

        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn names_without_extension_are_bare_tokens() {
        let (_dir, staging) = test_staging().await;

        let staged = staging.stage("upload", b"bytes").await.unwrap();
        assert!(!staged.object_name().contains('.'));
        assert_eq!(staged.content_type(), "application/octet-stream");
    }

    #[tokio::test]
    async fn concurrent_stagings_never_collide() {
        let (_dir, staging) = test_staging().await;

        let a = staging.stage("oak.png", b"a").await.unwrap();
        let b = staging.stage("oak.png", b"b").await.unwrap();
        assert_ne!(a.object_name(), b.object_name());
    }

    #[tokio::test]
    async fn init_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        Staging::init(&nested).await.unwrap();
        assert!(nested.is_dir());
    }
}
