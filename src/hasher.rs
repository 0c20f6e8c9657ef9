use crate::crypto;
use crate::storage::{BlobStore, Storage};
use crate::Result;

/// Reads stored document bytes and hashes them exactly as stored.
#[derive(Debug, Clone, Copy)]
pub struct DocumentHasher<'a> {
    storage: &'a Storage,
}

impl<'a> DocumentHasher<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub fn read(&self, blob_key: &str) -> Result<Vec<u8>> {
        self.storage.download(blob_key)
    }

    /// Base64 SHA-256 of the blob.
    pub fn hash(&self, blob_key: &str) -> Result<String> {
        let bytes = self.read(blob_key)?;
        Ok(crypto::hash(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_follows_blob_content() {
        let storage = Storage::memory();
        storage.upload("a.pdf", b"hello").unwrap();
        let hasher = DocumentHasher::new(&storage);
        assert_eq!(hasher.hash("a.pdf").unwrap(), crypto::hash(b"hello"));
        assert!(hasher.hash("missing.pdf").is_err());
    }
}
