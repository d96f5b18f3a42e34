//! Local filesystem image store

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use super::ImageStore;
use crate::error::{Error, Result};

const URL_PREFIX: &str = "file://";

/// Local filesystem image store
pub struct LocalImageStore {
    /// Directory where images are stored
    root: PathBuf,
}

impl LocalImageStore {
    /// Create a new local store
    ///
    /// Creates the image directory if it doesn't exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| {
                Error::Storage(format!(
                    "Failed to create image directory {}: {}",
                    root.display(),
                    e
                ))
            })?;
            info!("Created image directory: {}", root.display());
        }

        Ok(Self { root })
    }

    /// Get the image directory path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a storage name to a path inside the root
    fn name_path(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let safe = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(Error::Storage(format!("Invalid image name: {}", name)));
        }
        Ok(self.root.join(relative))
    }

    /// Resolve an image URL to a path inside the root
    ///
    /// URLs that point outside the root are rejected.
    fn url_path(&self, url: &str) -> Result<PathBuf> {
        let path = url
            .strip_prefix(URL_PREFIX)
            .map(PathBuf::from)
            .ok_or_else(|| Error::Storage(format!("Not a local image URL: {}", url)))?;

        let relative = path
            .strip_prefix(&self.root)
            .map_err(|_| Error::Storage(format!("Image is outside the store: {}", url)))?;
        self.name_path(&relative.to_string_lossy())
    }
}

impl ImageStore for LocalImageStore {
    fn name(&self) -> &str {
        "local"
    }

    fn upload(&self, data: &[u8], name: &str) -> Result<String> {
        let path = self.name_path(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;

        debug!("Stored image ({} bytes): {}", data.len(), path.display());
        Ok(format!("{}{}", URL_PREFIX, path.display()))
    }

    fn delete(&self, url: &str) -> Result<bool> {
        let path = self.url_path(url)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Deleted image: {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn size(&self, url: &str) -> Result<Option<u64>> {
        let path = self.url_path(url)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_store() -> (TempDir, LocalImageStore) {
        let temp = TempDir::new().unwrap();
        let store = LocalImageStore::new(temp.path().join("images")).unwrap();
        (temp, store)
    }

    #[test]
    fn test_new_creates_directory() {
        let (_temp, store) = setup_store();
        assert!(store.root().is_dir());
    }

    #[test]
    fn test_upload_size_delete() {
        let (_temp, store) = setup_store();

        let url = store.upload(b"jpeg bytes", "user-1/a.jpg").unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("user-1/a.jpg"));
        assert_eq!(store.size(&url).unwrap(), Some(10));

        assert!(store.delete(&url).unwrap());
        assert_eq!(store.size(&url).unwrap(), None);
        assert!(!store.delete(&url).unwrap());
    }

    #[test]
    fn test_rejects_escaping_names_and_urls() {
        let (temp, store) = setup_store();

        assert!(store.upload(b"x", "../outside.jpg").is_err());
        assert!(store.upload(b"x", "/etc/passwd").is_err());
        assert!(store.upload(b"x", "").is_err());

        let outside = format!("file://{}", temp.path().join("other.jpg").display());
        assert!(store.delete(&outside).is_err());
        assert!(store.size("https://example.com/a.jpg").is_err());
    }
}
