//! In-process stores backed by `BTreeMap`s.
//!
//! Used by the test-suite and by embedders that keep everything in memory.
//! Handles look like `./<seq>_<name>` so listings under `./` behave the same
//! as the filesystem backend.

use super::{BlobEntry, BlobStore, KeyValueStore, KvEntry, StoreError, UploadedBlob};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
    seq: AtomicU64,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>, StoreError> {
        self.blobs
            .lock()
            .map_err(|_| StoreError::Backend("blob map lock poisoned".into()))
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, name: &str, bytes: &[u8]) -> Result<Option<UploadedBlob>, StoreError> {
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        let path = format!("./{n}_{name}");
        self.lock()?.insert(path.clone(), bytes.to_vec());
        Ok(Some(UploadedBlob { path }))
    }

    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock()?.get(path).cloned())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.lock()?.remove(path);
        Ok(())
    }

    async fn list(&self, dir: &str) -> Result<Vec<BlobEntry>, StoreError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|(path, _)| path.starts_with(dir))
            .map(|(path, bytes)| {
                let name = path.rsplit('/').next().unwrap_or(path).to_string();
                BlobEntry {
                    mime_type: mime_for(&name).to_string(),
                    path: path.clone(),
                    name,
                    size: bytes.len() as u64,
                }
            })
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Backend("kv map lock poisoned".into()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn list(&self, prefix: &str, include_values: bool) -> Result<Vec<KvEntry>, StoreError> {
        Ok(self
            .lock()?
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| KvEntry {
                key: k.clone(),
                value: include_values.then(|| v.clone()),
            })
            .collect())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.lock()?.clear();
        Ok(())
    }
}

/// MIME type guessed from a file extension.
pub(crate) fn mime_for(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uploads_get_distinct_paths() {
        let store = MemoryBlobStore::new();
        let a = store.upload("cv.pdf", b"1").await.unwrap().unwrap();
        let b = store.upload("cv.pdf", b"2").await.unwrap().unwrap();
        assert_ne!(a.path, b.path);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn listing_reports_name_size_and_type() {
        let store = MemoryBlobStore::new();
        store.upload("cv.pdf", b"12345").await.unwrap();
        let entries = store.list("./").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "0_cv.pdf");
        assert_eq!(entries[0].size, 5);
        assert_eq!(entries[0].mime_type, "application/pdf");
    }

    #[tokio::test]
    async fn kv_list_respects_prefix_and_values_flag() {
        let kv = MemoryKeyValueStore::new();
        kv.set("resume:1", "a").await.unwrap();
        kv.set("resume:2", "b").await.unwrap();
        kv.set("session", "c").await.unwrap();

        let with_values = kv.list("resume:", true).await.unwrap();
        assert_eq!(with_values.len(), 2);
        assert_eq!(with_values[0].value.as_deref(), Some("a"));

        let keys_only = kv.list("resume:", false).await.unwrap();
        assert!(keys_only.iter().all(|e| e.value.is_none()));
    }

    #[test]
    fn mime_guess_is_case_insensitive() {
        assert_eq!(mime_for("A.PNG"), "image/png");
        assert_eq!(mime_for("noext"), "application/octet-stream");
    }
}
