//! Blob storage for uploaded PDFs.
//!
//! Blobs are write-once per key: a stored document is never rewritten, which is
//! what keeps ledger hashes meaningful after a document leaves DRAFT.

use crate::config::{Config, StorageType};
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`. Fails if the key is already used.
    fn upload(&self, key: &str, bytes: &[u8]) -> Result<String>;

    fn download(&self, key: &str) -> Result<Vec<u8>>;

    /// Deleting a missing blob is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// URL a client can fetch the blob from.
    fn url_for(&self, key: &str) -> Result<String>;
}

/// Keys are generated by the engine, but never trust them as paths.
fn check_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && key != "."
        && key != ".."
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::validation(format!("Invalid blob key `{}`", key)))
    }
}

/// Files in a directory on the local disk.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    upload_dir: PathBuf,
    base_url: String,
}

impl LocalBlobStore {
    pub fn new(upload_dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Result<Self> {
        let upload_dir = upload_dir.into();
        if !upload_dir.exists() {
            std::fs::create_dir_all(&upload_dir)?;
            log::info!("Created upload directory: {}", upload_dir.display());
        }
        Ok(Self {
            upload_dir,
            base_url: base_url.into(),
        })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    fn path_of(&self, key: &str) -> Result<PathBuf> {
        check_key(key)?;
        Ok(self.upload_dir.join(key))
    }
}

impl BlobStore for LocalBlobStore {
    fn upload(&self, key: &str, bytes: &[u8]) -> Result<String> {
        let path = self.path_of(key)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    Error::storage(format!("Blob `{}` already exists", key))
                }
                _ => Error::from(err),
            })?;
        file.write_all(bytes)?;
        file.sync_all()?;
        log::info!("File uploaded to local storage: {}", path.display());
        Ok(key.to_owned())
    }

    fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_of(key)?;
        std::fs::read(&path).map_err(|err| {
            log::error!("Failed to read blob `{}`: {}", path.display(), err);
            Error::storage(format!("Blob `{}` is unavailable", key))
        })
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_of(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                log::info!("File deleted from local storage: {}", key);
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("File not found for deletion: {}", key);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    fn url_for(&self, key: &str) -> Result<String> {
        check_key(key)?;
        Ok(format!(
            "{}/api/files/{}",
            self.base_url.trim_end_matches('/'),
            key
        ))
    }
}

/// Blobs kept in memory.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a blob in place, bypassing the write-once rule.
    /// Simulates out-of-band modification of the storage backend.
    pub fn overwrite(&self, key: &str, bytes: Vec<u8>) {
        self.blobs.write().insert(key.to_owned(), bytes);
    }
}

impl BlobStore for MemoryBlobStore {
    fn upload(&self, key: &str, bytes: &[u8]) -> Result<String> {
        check_key(key)?;
        let mut blobs = self.blobs.write();
        if blobs.contains_key(key) {
            return Err(Error::storage(format!("Blob `{}` already exists", key)));
        }
        blobs.insert(key.to_owned(), bytes.to_vec());
        Ok(key.to_owned())
    }

    fn download(&self, key: &str) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::storage(format!("Blob `{}` is unavailable", key)))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.blobs.write().remove(key);
        Ok(())
    }

    fn url_for(&self, key: &str) -> Result<String> {
        check_key(key)?;
        Ok(format!("memory://{}", key))
    }
}

/// The blob backend selected at startup.
#[derive(Clone)]
pub enum Storage {
    Local(Arc<LocalBlobStore>),
    Memory(Arc<MemoryBlobStore>),
    /// Object store supplied by the embedding application (e.g. an S3 compatible client).
    External(Arc<dyn BlobStore>),
}

impl Storage {
    pub fn from_config(config: &Config) -> Result<Self> {
        match config.storage.storage_type {
            StorageType::Local => Ok(Storage::Local(Arc::new(LocalBlobStore::new(
                config.storage.local.upload_dir.clone(),
                config.storage.local.base_url.clone(),
            )?))),
            StorageType::R2 => {
                config.validate()?;
                Err(Error::Config(
                    "storage.type = r2 needs an S3 compatible client, build it with `Storage::external`"
                        .to_owned(),
                ))
            }
        }
    }

    pub fn memory() -> Self {
        Storage::Memory(Arc::new(MemoryBlobStore::new()))
    }

    pub fn external(store: Arc<dyn BlobStore>) -> Self {
        Storage::External(store)
    }

    fn backend(&self) -> &dyn BlobStore {
        match self {
            Storage::Local(store) => store.as_ref(),
            Storage::Memory(store) => store.as_ref(),
            Storage::External(store) => store.as_ref(),
        }
    }
}

impl BlobStore for Storage {
    fn upload(&self, key: &str, bytes: &[u8]) -> Result<String> {
        self.backend().upload(key, bytes)
    }

    fn download(&self, key: &str) -> Result<Vec<u8>> {
        self.backend().download(key)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.backend().delete(key)
    }

    fn url_for(&self, key: &str) -> Result<String> {
        self.backend().url_for(key)
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Storage::Local(store) => f.debug_tuple("Local").field(store).finish(),
            Storage::Memory(_) => f.write_str("Memory"),
            Storage::External(_) => f.write_str("External"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MasterKey;

    #[test]
    fn test_local_store_is_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "http://localhost:5555/").unwrap();
        store.upload("a.pdf", b"first").unwrap();
        assert!(store.upload("a.pdf", b"second").is_err());
        assert_eq!(store.download("a.pdf").unwrap(), b"first");
        assert_eq!(
            store.url_for("a.pdf").unwrap(),
            "http://localhost:5555/api/files/a.pdf"
        );
        store.delete("a.pdf").unwrap();
        store.delete("a.pdf").unwrap();
        assert!(matches!(store.download("a.pdf"), Err(Error::Storage(_))));
    }

    #[test]
    fn test_keys_can_not_escape_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "http://localhost").unwrap();
        assert!(store.upload("../evil.pdf", b"x").is_err());
        assert!(store.download("..").is_err());
    }

    #[test]
    fn test_memory_store_overwrite() {
        let store = MemoryBlobStore::new();
        store.upload("doc.pdf", b"abc").unwrap();
        assert!(store.upload("doc.pdf", b"abd").is_err());
        store.overwrite("doc.pdf", b"abd".to_vec());
        assert_eq!(store.download("doc.pdf").unwrap(), b"abd");
    }

    #[test]
    fn test_r2_config_requires_external_client() {
        let mut config = Config::new(MasterKey::new([0u8; 32]), "http://localhost:5556");
        config.storage.storage_type = StorageType::R2;
        assert!(matches!(
            Storage::from_config(&config),
            Err(Error::Config(_))
        ));
    }
}
