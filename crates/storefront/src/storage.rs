//! Product image storage.
//!
//! Uploaded images are stored under a random key that keeps the original
//! file extension when it is a known image type. [`FsImageStore`] writes to
//! the media directory served at `/media`; [`MemoryImageStore`] keeps bytes
//! in memory for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// URL prefix the media directory is served under.
pub const MEDIA_PREFIX: &str = "/media";

/// Errors from image storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("empty upload")]
    Empty,
}

/// Object storage for product images.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store `bytes` and return the generated key.
    async fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<String, StorageError>;

    /// Remove a stored object. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Public URL for a key.
    fn public_url(&self, key: &str) -> String {
        format!("{MEDIA_PREFIX}/{key}")
    }
}

/// Image extensions a key may carry. `/media` picks the content type from it.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Build a fresh key for `file_name`: a v4 UUID plus the lower-cased extension.
///
/// Extensions outside [`IMAGE_EXTENSIONS`] are dropped, so an upload named
/// `page.html` is served as opaque bytes rather than as markup.
#[must_use]
pub fn generate_key(file_name: &str) -> String {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));

    match extension {
        Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
        None => Uuid::new_v4().to_string(),
    }
}

/// Keys are flat file names; anything that could escape the media dir is refused.
fn check_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
        return Err(StorageError::InvalidKey(key.to_owned()));
    }
    Ok(())
}

// =============================================================================
// Filesystem
// =============================================================================

/// Image store backed by a local directory.
#[derive(Debug, Clone)]
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory the images are written to.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::Empty);
        }
        tokio::fs::create_dir_all(&self.root).await?;
        let key = generate_key(file_name);
        tokio::fs::write(self.root.join(&key), bytes).await?;
        tracing::debug!(key = %key, size = bytes.len(), "Stored image");
        Ok(key)
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        check_key(key)?;
        match tokio::fs::remove_file(self.root.join(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// In-memory
// =============================================================================

/// Image store holding bytes in memory.
#[derive(Debug, Default)]
pub struct MemoryImageStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryImageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is currently stored.
    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ImageStore for MemoryImageStore {
    async fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::Empty);
        }
        let key = generate_key(file_name);
        self.objects.write().await.insert(key.clone(), bytes.to_vec());
        Ok(key)
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        check_key(key)?;
        self.objects.write().await.remove(key);
        Ok(())
    }
}
