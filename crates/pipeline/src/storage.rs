//! Artifact storage boundary.
//!
//! Previews and finals live at distinct locations. [`ArtifactStore::finalize`]
//! promotes a stored preview to the final location and is idempotent: once a
//! final exists, repeated calls return the same URL.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use covergen_core::compositor::encode_png;
use covergen_core::types::JobId;
use image::RgbaImage;
use tokio::sync::RwLock;

/// Directory (and URL segment) holding previews.
pub const PREVIEW_DIR: &str = "previews";
/// Directory (and URL segment) holding finals.
pub const FINAL_DIR: &str = "covers";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding failed: {0}")]
    Encode(String),

    #[error("No preview stored for job {0}")]
    PreviewMissing(JobId),
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store a finished cover and return its public URL.
    async fn store_final(&self, job_id: JobId, image: &RgbaImage) -> Result<String, StorageError>;

    /// Store a cover awaiting approval and return its public URL.
    async fn store_preview(&self, job_id: JobId, image: &RgbaImage) -> Result<String, StorageError>;

    /// Promote the preview to the final location, returning the final URL.
    async fn finalize(&self, job_id: JobId) -> Result<String, StorageError>;

    /// Remove the preview. Succeeds when none exists.
    async fn cleanup_preview(&self, job_id: JobId) -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// Local filesystem
// ---------------------------------------------------------------------------

/// Stores PNGs under `root/previews` and `root/covers`.
///
/// URLs are `{public_base_url}/{dir}/{file}`; the API serves `root` at that
/// base path.
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage directories.
    pub async fn ensure_dirs(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(self.root.join(PREVIEW_DIR)).await?;
        tokio::fs::create_dir_all(self.root.join(FINAL_DIR)).await?;
        Ok(())
    }

    fn preview_name(job_id: JobId) -> String {
        format!("preview_{job_id}.png")
    }

    fn final_name(job_id: JobId) -> String {
        format!("cover_{job_id}.png")
    }

    fn path(&self, dir: &str, file: &str) -> PathBuf {
        self.root.join(dir).join(file)
    }

    fn url(&self, dir: &str, file: &str) -> String {
        format!("{}/{dir}/{file}", self.public_base_url)
    }

    /// Encode off the async runtime and write through a temp file so readers
    /// never see a partial PNG.
    async fn write_png(&self, dir: &str, file: &str, image: &RgbaImage) -> Result<String, StorageError> {
        let owned = image.clone();
        let bytes = tokio::task::spawn_blocking(move || encode_png(&owned))
            .await
            .map_err(|e| StorageError::Encode(e.to_string()))?
            .map_err(|e| StorageError::Encode(e.to_string()))?;

        let target = self.path(dir, file);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = target.with_extension("png.tmp");
        tokio::fs::write(&staging, &bytes).await?;
        tokio::fs::rename(&staging, &target).await?;
        Ok(self.url(dir, file))
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn store_final(&self, job_id: JobId, image: &RgbaImage) -> Result<String, StorageError> {
        self.write_png(FINAL_DIR, &Self::final_name(job_id), image).await
    }

    async fn store_preview(&self, job_id: JobId, image: &RgbaImage) -> Result<String, StorageError> {
        self.write_png(PREVIEW_DIR, &Self::preview_name(job_id), image).await
    }

    async fn finalize(&self, job_id: JobId) -> Result<String, StorageError> {
        let final_name = Self::final_name(job_id);
        let target = self.path(FINAL_DIR, &final_name);
        if tokio::fs::try_exists(&target).await? {
            return Ok(self.url(FINAL_DIR, &final_name));
        }

        let preview = self.path(PREVIEW_DIR, &Self::preview_name(job_id));
        if !tokio::fs::try_exists(&preview).await? {
            return Err(StorageError::PreviewMissing(job_id));
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = target.with_extension("png.tmp");
        tokio::fs::copy(&preview, &staging).await?;
        tokio::fs::rename(&staging, &target).await?;
        Ok(self.url(FINAL_DIR, &final_name))
    }

    async fn cleanup_preview(&self, job_id: JobId) -> Result<(), StorageError> {
        let preview = self.path(PREVIEW_DIR, &Self::preview_name(job_id));
        match tokio::fs::remove_file(&preview).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Keeps images in memory. URLs use the `memory://` scheme.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    previews: RwLock<HashMap<JobId, RgbaImage>>,
    finals: RwLock<HashMap<JobId, RgbaImage>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn url(dir: &str, job_id: JobId) -> String {
        format!("memory://{dir}/{job_id}.png")
    }

    pub async fn preview(&self, job_id: JobId) -> Option<RgbaImage> {
        self.previews.read().await.get(&job_id).cloned()
    }

    pub async fn final_image(&self, job_id: JobId) -> Option<RgbaImage> {
        self.finals.read().await.get(&job_id).cloned()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn store_final(&self, job_id: JobId, image: &RgbaImage) -> Result<String, StorageError> {
        self.finals.write().await.insert(job_id, image.clone());
        Ok(Self::url(FINAL_DIR, job_id))
    }

    async fn store_preview(&self, job_id: JobId, image: &RgbaImage) -> Result<String, StorageError> {
        self.previews.write().await.insert(job_id, image.clone());
        Ok(Self::url(PREVIEW_DIR, job_id))
    }

    async fn finalize(&self, job_id: JobId) -> Result<String, StorageError> {
        let mut finals = self.finals.write().await;
        if !finals.contains_key(&job_id) {
            let preview = self
                .previews
                .read()
                .await
                .get(&job_id)
                .cloned()
                .ok_or(StorageError::PreviewMissing(job_id))?;
            finals.insert(job_id, preview);
        }
        Ok(Self::url(FINAL_DIR, job_id))
    }

    async fn cleanup_preview(&self, job_id: JobId) -> Result<(), StorageError> {
        self.previews.write().await.remove(&job_id);
        Ok(())
    }
}
