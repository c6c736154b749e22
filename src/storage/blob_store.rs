use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("invalid blob hash: {0:?}")]
    InvalidHash(String),
}

/// A stored file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    /// File-name-safe form of the content hash.
    pub hash: String,
    /// Extension without the dot; may be empty.
    pub extension: String,
    pub path: PathBuf,
    pub url: String,
}

/// Content-addressed storage for media, keyed by the service's file hash.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get_file_by_hash(&self, hash: &str) -> Option<FileDescriptor>;

    async fn add_blob(
        &self,
        hash: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<FileDescriptor, BlobError>;
}

/// [`BlobStore`] backed by a directory, with files published under a base URL.
#[derive(Debug)]
pub struct FsBlobStore {
    base_path: PathBuf,
    base_url: String,
    index: DashMap<String, FileDescriptor>,
}

impl FsBlobStore {
    /// Open (creating if needed) the directory and index the files already in it.
    pub async fn open(base_path: impl Into<PathBuf>, base_url: &str) -> Result<Self, BlobError> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;

        let store = Self {
            base_path,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: DashMap::new(),
        };

        let mut entries = fs::read_dir(&store.base_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let (stem, extension) = match name.split_once('.') {
                Some((stem, ext)) => (stem.to_string(), ext.to_string()),
                None => (name.clone(), String::new()),
            };
            let descriptor = store.descriptor(&stem, &extension);
            store.index.insert(stem, descriptor);
        }

        info!(
            path = %store.base_path.display(),
            files = store.index.len(),
            "blob store initialized"
        );
        Ok(store)
    }

    fn descriptor(&self, file_stem: &str, extension: &str) -> FileDescriptor {
        let file_name = if extension.is_empty() {
            file_stem.to_string()
        } else {
            format!("{}.{}", file_stem, extension)
        };
        FileDescriptor {
            hash: file_stem.to_string(),
            extension: extension.to_string(),
            path: self.base_path.join(&file_name),
            url: format!("{}/{}", self.base_url, file_name),
        }
    }
}

/// Map a base64 hash onto a file-name-safe stem.
fn file_stem(hash: &str) -> Result<String, BlobError> {
    let stem: String = hash
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '/' => '_',
            '+' => '-',
            c => c,
        })
        .collect();

    if stem.is_empty() || !stem.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(BlobError::InvalidHash(hash.to_string()));
    }
    Ok(stem)
}

fn clean_extension(extension: &str) -> String {
    extension
        .trim_start_matches('.')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get_file_by_hash(&self, hash: &str) -> Option<FileDescriptor> {
        let stem = file_stem(hash).ok()?;
        self.index.get(&stem).map(|entry| entry.value().clone())
    }

    async fn add_blob(
        &self,
        hash: &str,
        extension: &str,
        bytes: &[u8],
    ) -> Result<FileDescriptor, BlobError> {
        let stem = file_stem(hash)?;
        let descriptor = self.descriptor(&stem, &clean_extension(extension));

        // Write under a private temporary name so readers never see a partial
        // file and concurrent writers of the same hash do not collide.
        let tmp_path = self
            .base_path
            .join(format!(".{}.{}.tmp", stem, Uuid::new_v4()));
        fs::write(&tmp_path, bytes).await?;
        if let Err(e) = fs::rename(&tmp_path, &descriptor.path).await {
            let _ = fs::remove_file(&tmp_path).await;
            if !fs::try_exists(&descriptor.path).await.unwrap_or(false) {
                return Err(e.into());
            }
            debug!(%hash, "blob already stored by another writer");
        }

        debug!(%hash, path = %descriptor.path.display(), size = bytes.len(), "stored blob");
        self.index.insert(stem, descriptor.clone());
        Ok(descriptor)
    }
}
