//! Filesystem-backed stores for the CLI's data directory.
//!
//! ```text
//! <data-dir>/
//!   blobs/   uploaded documents and rasters, one file per upload
//!   kv.json  the key-value store as a single JSON object
//! ```
//!
//! Blob handles are `./<8 hex chars>_<sanitised name>`, relative to
//! `blobs/`. The key-value file is rewritten atomically (temp file + rename)
//! on every `set`, so a crash mid-write never leaves a truncated store.

use super::memory::mime_for;
use super::{BlobEntry, BlobStore, KeyValueStore, KvEntry, StoreError, UploadedBlob};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a `./name` handle to its file, rejecting anything that escapes
    /// the root.
    fn resolve(&self, handle: &str) -> Option<PathBuf> {
        let name = handle.strip_prefix("./").unwrap_or(handle);
        if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
            return None;
        }
        Some(self.root.join(name))
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn sanitise(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, name: &str, bytes: &[u8]) -> Result<Option<UploadedBlob>, StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(io_err(&self.root))?;

        let tag = uuid::Uuid::new_v4().simple().to_string();
        let file_name = format!("{}_{}", &tag[..8], sanitise(name));
        let path = self.root.join(&file_name);
        tokio::fs::write(&path, bytes).await.map_err(io_err(&path))?;
        debug!("Wrote blob {}", path.display());

        Ok(Some(UploadedBlob {
            path: format!("./{file_name}"),
        }))
    }

    async fn read(&self, handle: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let Some(path) = self.resolve(handle) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    async fn delete(&self, handle: &str) -> Result<(), StoreError> {
        let Some(path) = self.resolve(handle) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path)(e)),
        }
    }

    async fn list(&self, dir: &str) -> Result<Vec<BlobEntry>, StoreError> {
        let mut entries = Vec::new();
        let mut read_dir = match tokio::fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(io_err(&self.root)(e)),
        };

        while let Some(entry) = read_dir.next_entry().await.map_err(io_err(&self.root))? {
            let meta = entry.metadata().await.map_err(io_err(&entry.path()))?;
            if !meta.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let path = format!("./{name}");
            if !path.starts_with(dir) {
                continue;
            }
            entries.push(BlobEntry {
                mime_type: mime_for(&name).to_string(),
                path,
                name,
                size: meta.len(),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

/// Key-value store persisted as one JSON object on disk.
pub struct FsKeyValueStore {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FsKeyValueStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Corrupt(format!("{}: {e}", self.path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(io_err(&self.path)(e)),
        }
    }

    async fn save(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_err(parent))?;
        }
        let json = serde_json::to_vec_pretty(map)
            .map_err(|e| StoreError::Backend(format!("encode kv store: {e}")))?;

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(io_err(&tmp_path))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(io_err(&self.path))
    }
}

#[async_trait]
impl KeyValueStore for FsKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut map = self.load().await?;
        map.insert(key.to_string(), value.to_string());
        self.save(&map).await
    }

    async fn list(&self, prefix: &str, include_values: bool) -> Result<Vec<KvEntry>, StoreError> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(key, value)| KvEntry {
                key,
                value: include_values.then_some(value),
            })
            .collect())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.save(&BTreeMap::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitise_strips_separators_and_leading_dots() {
        assert_eq!(sanitise("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitise("my cv (final).pdf"), "my_cv__final_.pdf");
        assert_eq!(sanitise("..."), "upload");
    }

    #[tokio::test]
    async fn blob_round_trip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("blobs"));

        let uploaded = store.upload("cv.pdf", b"%PDF-1.7").await.unwrap().unwrap();
        assert!(uploaded.path.starts_with("./"));
        assert!(uploaded.path.ends_with("_cv.pdf"));
        assert_eq!(store.read(&uploaded.path).await.unwrap().unwrap(), b"%PDF-1.7");

        let listed = store.list("./").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].mime_type, "application/pdf");
        assert_eq!(listed[0].size, 8);

        store.delete(&uploaded.path).await.unwrap();
        assert!(store.read(&uploaded.path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_rejects_escaping_handles() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        assert!(store.read("./../secret").await.unwrap().is_none());
        assert!(store.read("..").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_on_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path().join("never-created"));
        assert!(store.list("./").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn kv_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.json");

        let kv = FsKeyValueStore::new(&path);
        kv.set("resume:1", "{\"a\":1}").await.unwrap();
        kv.set("resume:2", "{}").await.unwrap();
        drop(kv);

        let reopened = FsKeyValueStore::new(&path);
        assert_eq!(reopened.get("resume:1").await.unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(reopened.list("resume:", false).await.unwrap().len(), 2);

        reopened.flush().await.unwrap();
        assert!(reopened.get("resume:1").await.unwrap().is_none());
        assert!(!dir.path().join("kv.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_kv_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kv.json");
        std::fs::write(&path, b"not json").unwrap();

        let kv = FsKeyValueStore::new(&path);
        assert!(matches!(kv.get("x").await, Err(StoreError::Corrupt(_))));
    }
}
