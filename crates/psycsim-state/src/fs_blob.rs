//! Filesystem-backed blob store
//!
//! Layout: `<root>/<path>`, where `path` is the relative blob path handed to
//! [`BlobStore::upload`] (e.g. `llm/simulation_job-1_20260101T000000Z.json`).

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{StateError, StorageError};
use crate::storage_traits::{BlobStore, StorageResult};

const DEFAULT_BLOB_DIR: &str = ".psycsim/blobs";

/// Blob store writing each upload atomically under a root directory.
///
/// The returned URL is `<public_base>/<path>` when a public base is
/// configured, otherwise a `file://` URL of the written file.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    public_base: Option<String>,
}

impl FsBlobStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>, public_base: Option<String>) -> crate::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            StateError::Filesystem(format!(
                "Failed to create blob directory {}: {e}",
                root.display()
            ))
        })?;
        let public_base = public_base.map(|b| b.trim_end_matches('/').to_string());
        Ok(Self { root, public_base })
    }

    /// Configure from `PSYCSIM_BLOB_DIR` and `PSYCSIM_BLOB_PUBLIC_URL`.
    pub fn from_env() -> crate::Result<Self> {
        let root =
            std::env::var("PSYCSIM_BLOB_DIR").unwrap_or_else(|_| DEFAULT_BLOB_DIR.to_string());
        let public_base = std::env::var("PSYCSIM_BLOB_PUBLIC_URL").ok();
        Self::new(root, public_base)
    }

    /// Resolve a blob path below the root, rejecting anything that could
    /// escape it.
    fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(path);
        let is_plain = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(StorageError::Blob {
                path: path.to_string(),
                reason: "blob path must be relative without '..' segments".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }

    fn url_for(&self, path: &str, target: &Path) -> String {
        match &self.public_base {
            Some(base) => format!("{base}/{path}"),
            None => {
                let absolute = target
                    .canonicalize()
                    .unwrap_or_else(|_| target.to_path_buf());
                format!("file://{}", absolute.display())
            }
        }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> StorageResult<String> {
        let target = self.resolve(path)?;
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        let written = tokio::task::spawn_blocking({
            let target = target.clone();
            move || -> std::io::Result<()> {
                fs::create_dir_all(&parent)?;
                // Write to a temp file in the same directory, then rename.
                let mut tmp = NamedTempFile::new_in(&parent)?;
                tmp.write_all(&bytes)?;
                tmp.persist(&target).map_err(|e| e.error)?;
                Ok(())
            }
        })
        .await
        .map_err(|e| StorageError::Backend(format!("blob writer task failed: {e}")))?;
        written?;

        debug!(path, target = %target.display(), "blob uploaded");
        Ok(self.url_for(path, &target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_writes_file_and_returns_public_url() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            FsBlobStore::new(dir.path(), Some("https://blobs.example.org/".to_string())).unwrap();

        let url = store
            .upload("llm/report.json", b"{}".to_vec())
            .await
            .unwrap();

        assert_eq!(url, "https://blobs.example.org/llm/report.json");
        let written = fs::read(dir.path().join("llm/report.json")).unwrap();
        assert_eq!(written, b"{}");
    }

    #[tokio::test]
    async fn upload_without_public_base_returns_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), None).unwrap();

        let url = store.upload("a.json", b"[]".to_vec()).await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("a.json"));
    }

    #[tokio::test]
    async fn escaping_paths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path(), None).unwrap();

        for bad in ["../outside.json", "/etc/passwd", ""] {
            let err = store.upload(bad, Vec::new()).await.unwrap_err();
            assert!(matches!(err, StorageError::Blob { .. }), "{bad}");
        }
    }
}
