//! Image upload collaborator.
//!
//! Issue photos are written to disk under a random UUID and referred to by a
//! media reference of the form `{base_url}/{uuid}`. The engine only sees the
//! [`ImageUploader`] trait, so a remote object store can replace
//! [`MediaStore`] without touching the lifecycle code.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServerError;

/// An image payload as received from the caller, before upload.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl RawImage {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            file_name: None,
            content_type: None,
            data: data.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Accepts raw images and hands back a stable media reference.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload(&self, image: RawImage) -> Result<String, ServerError>;

    /// Remove a previously uploaded image. Used to undo the uploads of a
    /// submission that did not go through.
    async fn discard(&self, media_ref: &str) -> Result<(), ServerError>;
}

/// Verify that a resolved path stays within the expected base directory.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, ServerError> {
    // Canonicalize base; target may not exist yet so normalize manually
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    let mut resolved = canonical_base.clone();
    for component in target
        .strip_prefix(base)
        .or_else(|_| target.strip_prefix(&canonical_base))
        .unwrap_or(target)
        .components()
    {
        match component {
            std::path::Component::Normal(c) => resolved.push(c),
            std::path::Component::ParentDir => {
                return Err(ServerError::BadRequest("Path traversal detected".to_string()));
            }
            _ => {}
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(ServerError::BadRequest("Path traversal detected".to_string()));
    }
    Ok(resolved)
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    base_path: PathBuf,
    base_url: String,
    max_size: usize,
}

impl MediaStore {
    pub async fn new(
        base_path: PathBuf,
        base_url: impl Into<String>,
        max_size: usize,
    ) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::MediaStorage(format!(
                "Failed to create media directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Media store initialized");

        Ok(Self {
            base_path,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_size,
        })
    }

    pub async fn store_image(&self, data: &[u8]) -> Result<Uuid, ServerError> {
        if data.is_empty() {
            return Err(ServerError::BadRequest("Empty image".to_string()));
        }
        if data.len() > self.max_size {
            return Err(ServerError::ImageTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let id = Uuid::new_v4();
        let path = self.safe_media_path(&id)?;
        let staging = ensure_within(&self.base_path, &self.base_path.join(format!(".{id}.part")))?;

        // Only complete images ever appear under their final name.
        if let Err(e) = fs::write(&staging, data).await {
            let _ = fs::remove_file(&staging).await;
            return Err(ServerError::MediaStorage(format!(
                "Failed to write image {}: {}",
                id, e
            )));
        }
        fs::rename(&staging, &path).await.map_err(|e| {
            ServerError::MediaStorage(format!("Failed to publish image {}: {}", id, e))
        })?;

        debug!(id = %id, size = data.len(), "Stored image");
        Ok(id)
    }

    pub async fn get_image(&self, id: Uuid) -> Result<Vec<u8>, ServerError> {
        let path = self.safe_media_path(&id)?;

        if !path.exists() {
            return Err(ServerError::MediaNotFound(id));
        }

        let data = fs::read(&path).await.map_err(|e| {
            ServerError::MediaStorage(format!("Failed to read image {}: {}", id, e))
        })?;

        debug!(id = %id, size = data.len(), "Retrieved image");
        Ok(data)
    }

    pub async fn delete_image(&self, id: Uuid) -> Result<(), ServerError> {
        let path = self.safe_media_path(&id)?;

        if !path.exists() {
            return Err(ServerError::MediaNotFound(id));
        }

        fs::remove_file(&path).await.map_err(|e| {
            ServerError::MediaStorage(format!("Failed to delete image {}: {}", id, e))
        })?;

        debug!(id = %id, "Deleted image");
        Ok(())
    }

    /// Media reference handed out for a stored image.
    pub fn media_ref(&self, id: Uuid) -> String {
        format!("{}/{}", self.base_url, id)
    }

    /// Inverse of [`MediaStore::media_ref`]. References from another base
    /// URL are not ours and yield `None`.
    pub fn parse_media_ref(&self, media_ref: &str) -> Option<Uuid> {
        let rest = media_ref.strip_prefix(&self.base_url)?.strip_prefix('/')?;
        Uuid::parse_str(rest).ok()
    }

    fn safe_media_path(&self, id: &Uuid) -> Result<PathBuf, ServerError> {
        let raw = self.base_path.join(id.to_string());
        ensure_within(&self.base_path, &raw)
    }
}

#[async_trait]
impl ImageUploader for MediaStore {
    async fn upload(&self, image: RawImage) -> Result<String, ServerError> {
        let id = self.store_image(&image.data).await?;
        debug!(
            id = %id,
            file_name = image.file_name.as_deref().unwrap_or(""),
            content_type = image.content_type.as_deref().unwrap_or(""),
            "Uploaded issue image"
        );
        Ok(self.media_ref(id))
    }

    async fn discard(&self, media_ref: &str) -> Result<(), ServerError> {
        let id = self.parse_media_ref(media_ref).ok_or_else(|| {
            ServerError::BadRequest(format!("Not a local media reference: {media_ref}"))
        })?;
        self.delete_image(id).await
    }
}
