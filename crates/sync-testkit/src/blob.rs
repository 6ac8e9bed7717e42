//! `MemoryBlobStore`: an in-process `BlobStore` for tests, so snapshot
//! chunk offload can be exercised without a filesystem.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sync_store::blob::BlobStore;

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, body: &[u8]) -> std::io::Result<()> {
        self.blobs.lock().unwrap().insert(key.to_string(), body.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> std::io::Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().unwrap().get(key).cloned())
    }

    async fn exists(&self, key: &str) -> std::io::Result<bool> {
        Ok(self.blobs.lock().unwrap().contains_key(key))
    }

    async fn delete(&self, key: &str) -> std::io::Result<()> {
        self.blobs.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryBlobStore::new();
        assert!(!store.exists("k1").await.unwrap());
        store.put("k1", b"hello").await.unwrap();
        assert!(store.exists("k1").await.unwrap());
        assert_eq!(store.get("k1").await.unwrap(), Some(b"hello".to_vec()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_then_get_returns_none() {
        let store = MemoryBlobStore::new();
        store.put("k1", b"hello").await.unwrap();
        store.delete("k1").await.unwrap();
        assert!(!store.exists("k1").await.unwrap());
        assert_eq!(store.get("k1").await.unwrap(), None);
    }
}
