//! Object store holding the known-face images.

use crate::error::StoreError;
use async_trait::async_trait;
use image::ImageFormat;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// One listed object. Names are `/`-separated paths, e.g. `img/alice.jpg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// MIME type, if the store knows one.
    pub content_type: Option<String>,
    pub size: u64,
}

impl ObjectMetadata {
    /// True when the content type starts with `image/`.
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
    }
}

/// List, inspect and download objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Every object whose name starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StoreError>;

    async fn metadata(&self, name: &str) -> Result<ObjectMetadata, StoreError>;

    async fn download(&self, name: &str) -> Result<Vec<u8>, StoreError>;
}

/// Object store backed by a local directory tree ("bucket" = root dir).
///
/// Content types are inferred from file extensions.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        let rel = Path::new(name);
        if name.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(rel))
    }
}

/// MIME type for an object name, from its extension.
pub fn content_type_for(name: &str) -> Option<String> {
    let ext = Path::new(name).extension()?.to_str()?;
    ImageFormat::from_extension(ext).map(|f| f.to_mime_type().to_string())
}

fn not_found_or_io(name: &str, err: std::io::Error) -> StoreError {
    if err.kind() == std::io::ErrorKind::NotFound {
        StoreError::NotFound(name.to_string())
    } else {
        StoreError::Io(err)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StoreError> {
        let root = self.root.clone();
        let prefix = prefix.to_string();

        tokio::task::spawn_blocking(move || {
            if !root.is_dir() {
                return Err(StoreError::RootNotFound(root.display().to_string()));
            }

            let mut entries = Vec::new();
            for entry in WalkDir::new(&root).sort_by_file_name() {
                let entry = entry?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(rel) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let name = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if name.starts_with(&prefix) {
                    entries.push(ObjectEntry { name });
                }
            }

            tracing::debug!(root = %root.display(), prefix, count = entries.len(), "listed objects");
            Ok(entries)
        })
        .await?
    }

    async fn metadata(&self, name: &str) -> Result<ObjectMetadata, StoreError> {
        let path = self.resolve(name)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| not_found_or_io(name, e))?;
        if !meta.is_file() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(ObjectMetadata {
            content_type: content_type_for(name),
            size: meta.len(),
        })
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.resolve(name)?;
        tokio::fs::read(&path).await.map_err(|e| not_found_or_io(name, e))
    }
}
