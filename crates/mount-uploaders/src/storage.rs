//! Storage Abstraction
//!
//! Byte-level backends used by `StoredUploader`. Keys are relative,
//! slash-separated paths such as `uploads/avatars/a.png`.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use mount_core::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

/// What a backend reports about a stored key
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,
    /// Content type (MIME)
    pub content_type: String,
    /// SHA256 digest
    pub digest: String,
    /// Last modified time
    pub last_modified: Option<DateTime<Utc>>,
}

impl FileMetadata {
    fn describe(key: &str, data: &[u8]) -> Self {
        Self {
            size: data.len() as u64,
            content_type: guess_content_type(key),
            digest: calculate_digest(data),
            last_modified: Some(Utc::now()),
        }
    }
}

/// Byte store shared by every uploader of a kind
pub trait Storage: Send + Sync {
    /// Store data with a key
    fn put(&self, key: &str, data: Bytes) -> StorageResult<FileMetadata>;

    /// Retrieve data by key
    fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Delete data by key; deleting a missing key is not an error
    fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check if key exists
    fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get file metadata
    fn metadata(&self, key: &str) -> StorageResult<FileMetadata>;

    /// Public URL for a key
    fn url(&self, key: &str) -> String;

    /// Move a file to a new key
    fn rename(&self, from_key: &str, to_key: &str) -> StorageResult<()>;

    /// Backend name, used as a tracing field
    fn name(&self) -> &str;
}

/// Calculate SHA256 digest
pub fn calculate_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Guess content type from filename
pub fn guess_content_type(key: &str) -> String {
    mime_guess::from_path(key)
        .first_or_octet_stream()
        .to_string()
}

/// Keys mapped to files under a root directory
pub struct LocalStorage {
    /// Root directory for storage
    root: PathBuf,
    /// Base URL for generating URLs
    base_url: String,
}

impl LocalStorage {
    pub fn new(root: impl AsRef<Path>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            base_url: base_url.into(),
        }
    }

    /// Resolve a key to a full path
    fn resolve_path(&self, key: &str) -> StorageResult<PathBuf> {
        // Keys must stay under the root
        if key.is_empty() || key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidPath(key.to_string()));
        }

        Ok(self.root.join(key))
    }

    fn ensure_parent(path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl Storage for LocalStorage {
    #[instrument(skip(self, data), fields(storage = "local"))]
    fn put(&self, key: &str, data: Bytes) -> StorageResult<FileMetadata> {
        let path = self.resolve_path(key)?;
        Self::ensure_parent(&path)?;

        let metadata = FileMetadata::describe(key, &data);

        let mut file = fs::File::create(&path)?;
        file.write_all(&data)?;
        file.sync_all()?;

        debug!(path = ?path, size = metadata.size, "File stored");

        Ok(metadata)
    }

    #[instrument(skip(self), fields(storage = "local"))]
    fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.resolve_path(key)?;

        if !path.exists() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        Ok(Bytes::from(fs::read(&path)?))
    }

    #[instrument(skip(self), fields(storage = "local"))]
    fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.resolve_path(key)?;

        if path.exists() {
            fs::remove_file(&path)?;
            debug!(path = ?path, "File deleted");
        }

        Ok(())
    }

    fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.resolve_path(key)?;
        Ok(path.exists())
    }

    fn metadata(&self, key: &str) -> StorageResult<FileMetadata> {
        let path = self.resolve_path(key)?;

        if !path.exists() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let meta = fs::metadata(&path)?;
        let data = fs::read(&path)?;

        Ok(FileMetadata {
            size: meta.len(),
            content_type: guess_content_type(key),
            digest: calculate_digest(&data),
            last_modified: meta.modified().ok().map(DateTime::from),
        })
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }

    #[instrument(skip(self), fields(storage = "local"))]
    fn rename(&self, from_key: &str, to_key: &str) -> StorageResult<()> {
        let from_path = self.resolve_path(from_key)?;
        let to_path = self.resolve_path(to_key)?;

        if !from_path.exists() {
            return Err(StorageError::NotFound(from_key.to_string()));
        }

        Self::ensure_parent(&to_path)?;
        fs::rename(&from_path, &to_path)?;

        Ok(())
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// Process-local backend, mostly for tests
pub struct MemoryStorage {
    files: RwLock<HashMap<String, (Bytes, FileMetadata)>>,
    base_url: String,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            base_url: "/memory".to_string(),
        }
    }

    /// Stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.files.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Storage for MemoryStorage {
    fn put(&self, key: &str, data: Bytes) -> StorageResult<FileMetadata> {
        let metadata = FileMetadata::describe(key, &data);
        self.files
            .write()
            .insert(key.to_string(), (data, metadata.clone()));
        Ok(metadata)
    }

    fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.files
            .read()
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        self.files.write().remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.files.read().contains_key(key))
    }

    fn metadata(&self, key: &str) -> StorageResult<FileMetadata> {
        self.files
            .read()
            .get(key)
            .map(|(_, meta)| meta.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn rename(&self, from_key: &str, to_key: &str) -> StorageResult<()> {
        let mut files = self.files.write();
        let entry = files
            .remove(from_key)
            .ok_or_else(|| StorageError::NotFound(from_key.to_string()))?;
        files.insert(to_key.to_string(), entry);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_put_get() {
        let memory = MemoryStorage::new();
        let avatar = Bytes::from("notes for the avatar");

        let meta = memory.put("uploads/avatar/notes.txt", avatar.clone()).unwrap();
        assert_eq!(meta.size, 20);
        assert_eq!(meta.content_type, "text/plain");
        assert_eq!(memory.get("uploads/avatar/notes.txt").unwrap(), avatar);
        assert_eq!(memory.url("uploads/avatar/notes.txt"), "/memory/uploads/avatar/notes.txt");
    }

    #[test]
    fn test_memory_storage_delete() {
        let storage = MemoryStorage::new();

        storage.put("test.txt", Bytes::from("test data")).unwrap();
        assert!(storage.exists("test.txt").unwrap());

        storage.delete("test.txt").unwrap();
        assert!(!storage.exists("test.txt").unwrap());

        // Deleting twice is fine
        storage.delete("test.txt").unwrap();
    }

    #[test]
    fn test_memory_storage_rename() {
        let storage = MemoryStorage::new();
        let data = Bytes::from("move me");

        storage.put("tmp/a.txt", data.clone()).unwrap();
        storage.rename("tmp/a.txt", "store/a.txt").unwrap();

        assert!(!storage.exists("tmp/a.txt").unwrap());
        assert_eq!(storage.get("store/a.txt").unwrap(), data);
        assert_eq!(storage.keys(), vec!["store/a.txt"]);
    }

    #[test]
    fn test_memory_storage_not_found() {
        let storage = MemoryStorage::new();

        let result = storage.get("nonexistent.txt");
        assert!(matches!(result, Err(StorageError::NotFound(_))));

        let result = storage.rename("nonexistent.txt", "other.txt");
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_digest() {
        let meta = MemoryStorage::new()
            .put("a.txt", Bytes::from("abc"))
            .unwrap();
        assert_eq!(
            meta.digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_local_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "/uploads/");

        storage
            .put("tmp/1/report.pdf", Bytes::from("pdf bytes"))
            .unwrap();
        storage.rename("tmp/1/report.pdf", "docs/report.pdf").unwrap();

        assert!(!storage.exists("tmp/1/report.pdf").unwrap());
        assert_eq!(
            storage.get("docs/report.pdf").unwrap(),
            Bytes::from("pdf bytes")
        );

        let meta = storage.metadata("docs/report.pdf").unwrap();
        assert_eq!(meta.size, 9);
        assert_eq!(meta.content_type, "application/pdf");

        assert_eq!(storage.url("docs/report.pdf"), "/uploads/docs/report.pdf");

        storage.delete("docs/report.pdf").unwrap();
        assert!(!storage.exists("docs/report.pdf").unwrap());
    }

    #[test]
    fn test_local_storage_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path(), "/uploads");

        let result = storage.get("../../../etc/passwd");
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));

        let result = storage.put("/etc/passwd", Bytes::from("x"));
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));
    }
}
