//! Local photo storage for the direct-database mode.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::BitsError;
use crate::models::PhotoUpload;
use crate::store::{photo_object_path, PhotoStore};

/// Writes photos under a root directory using the same `<owner>/<id>.<ext>`
/// layout as the hosted bucket. Returns `file://` URLs.
#[derive(Debug, Clone)]
pub struct FsPhotoStore {
    root: PathBuf,
}

impl FsPhotoStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl PhotoStore for FsPhotoStore {
    async fn upload_photo(&self, owner: Uuid, photo: &PhotoUpload) -> Result<String, BitsError> {
        let object_path = photo_object_path(owner, photo);
        let target = self.root.join(&object_path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &photo.bytes).await?;

        let absolute = tokio::fs::canonicalize(&target).await?;
        tracing::debug!(path = %absolute.display(), bytes = photo.bytes.len(), "Photo written");
        Ok(format!("file://{}", absolute.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_writes_under_owner_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPhotoStore::new(dir.path());
        let owner = Uuid::new_v4();
        let photo = PhotoUpload::new("image/jpeg", vec![0xFFu8, 0xD8, 0xFF]);

        let url = store.upload_photo(owner, &photo).await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with(".jpg"));

        let path = url.trim_start_matches("file://");
        assert!(path.contains(&owner.to_string()));
        assert_eq!(std::fs::read(path).unwrap(), vec![0xFFu8, 0xD8, 0xFF]);
    }

    #[tokio::test]
    async fn test_uploads_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPhotoStore::new(dir.path());
        let owner = Uuid::new_v4();
        let photo = PhotoUpload::new("image/png", vec![1u8]);

        let a = store.upload_photo(owner, &photo).await.unwrap();
        let b = store.upload_photo(owner, &photo).await.unwrap();
        assert_ne!(a, b);
    }
}
