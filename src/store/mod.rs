//! Storage contracts and the two clients the pipeline writes through.
//!
//! The blob store and key-value store are external services; this module
//! only fixes their contracts ([`BlobStore`], [`KeyValueStore`]) and adds the
//! thin clients the orchestrator uses:
//!
//! * [`ArtifactStore`]: uploads bytes, turning an empty upload response into
//!   [`PipelineError::UploadFailed`] instead of an ambiguous handle.
//! * [`JobRecords`]: JSON (de)serialisation of [`JobRecord`] under
//!   `resume:<id>`, plus the single partial update that writes the analysis
//!   result.
//!
//! Two backends ship with the crate: [`memory`] (tests, embedding) and
//! [`fs`] (the CLI's on-disk data directory).

pub mod fs;
pub mod memory;

use crate::error::PipelineError;
use crate::record::{AnalysisFeedback, ArtifactHandle, JobId, JobRecord};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Key prefix for job records.
pub const DEFAULT_RECORD_PREFIX: &str = "resume:";

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Key-value store is corrupt: {0}")]
    Corrupt(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

// ── External contracts ───────────────────────────────────────────────────

/// What the blob store returns for a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedBlob {
    pub path: String,
}

/// One entry of a blob directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobEntry {
    pub path: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
}

/// One entry of a key-value listing. `value` is `None` when values were not
/// requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvEntry {
    pub key: String,
    pub value: Option<String>,
}

/// Blob/object store contract.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under a name derived from `name`. `Ok(None)` means the
    /// backend answered without a handle.
    async fn upload(&self, name: &str, bytes: &[u8]) -> Result<Option<UploadedBlob>, StoreError>;

    /// `Ok(None)` when nothing is stored at `path`.
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    async fn list(&self, dir: &str) -> Result<Vec<BlobEntry>, StoreError>;
}

/// Key-value record store contract.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn list(&self, prefix: &str, include_values: bool) -> Result<Vec<KvEntry>, StoreError>;

    /// Remove every key.
    async fn flush(&self) -> Result<(), StoreError>;
}

// ── Artifact Store Client ────────────────────────────────────────────────

/// Uploads and fetches pipeline artifacts.
#[derive(Clone)]
pub struct ArtifactStore {
    blobs: Arc<dyn BlobStore>,
}

impl ArtifactStore {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Upload `bytes`; a missing or empty handle is a hard failure.
    pub async fn store(
        &self,
        bytes: &[u8],
        suggested_name: &str,
    ) -> Result<ArtifactHandle, PipelineError> {
        let uploaded = self.blobs.upload(suggested_name, bytes).await?;
        match uploaded {
            Some(blob) if !blob.path.is_empty() => {
                debug!("Stored '{}' ({} bytes) at {}", suggested_name, bytes.len(), blob.path);
                Ok(ArtifactHandle::new(blob.path))
            }
            _ => Err(PipelineError::UploadFailed {
                name: suggested_name.to_string(),
            }),
        }
    }

    pub async fn fetch(&self, handle: &ArtifactHandle) -> Result<Vec<u8>, PipelineError> {
        self.blobs
            .read(handle.as_str())
            .await?
            .ok_or_else(|| PipelineError::ArtifactMissing {
                handle: handle.to_string(),
            })
    }
}

// ── Record Store Client ──────────────────────────────────────────────────

/// Reads and writes [`JobRecord`]s in the key-value store.
#[derive(Clone)]
pub struct JobRecords {
    kv: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl JobRecords {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self::with_prefix(kv, DEFAULT_RECORD_PREFIX)
    }

    pub fn with_prefix(kv: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
        }
    }

    /// `resume:<id>` (or the configured prefix).
    pub fn key(&self, id: &JobId) -> String {
        format!("{}{}", self.prefix, id)
    }

    /// Serialise and overwrite whatever is stored under `id`.
    pub async fn put(&self, id: &JobId, record: &JobRecord) -> Result<(), PipelineError> {
        let key = self.key(id);
        let value = serde_json::to_string(record).map_err(|e| PipelineError::RecordEncoding {
            key: key.clone(),
            detail: e.to_string(),
        })?;
        self.kv.set(&key, &value).await?;
        debug!("Persisted record {}", key);
        Ok(())
    }

    pub async fn get(&self, id: &JobId) -> Result<Option<JobRecord>, PipelineError> {
        let key = self.key(id);
        match self.kv.get(&key).await? {
            Some(raw) => decode(&key, &raw).map(Some),
            None => Ok(None),
        }
    }

    /// Write the analysis result into the stored record, leaving every other
    /// field as persisted.
    pub async fn set_result(
        &self,
        id: &JobId,
        result: AnalysisFeedback,
    ) -> Result<JobRecord, PipelineError> {
        let mut record = self
            .get(id)
            .await?
            .ok_or_else(|| PipelineError::RecordNotFound { id: id.clone() })?;
        if record.is_analyzed() {
            return Err(PipelineError::AlreadyAnalyzed { id: id.clone() });
        }
        record.result = Some(result);
        self.put(id, &record).await?;
        Ok(record)
    }

    /// Every record under the prefix. Entries that do not decode are skipped.
    pub async fn list(&self) -> Result<Vec<JobRecord>, PipelineError> {
        let entries = self.kv.list(&self.prefix, true).await?;
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(raw) = entry.value else { continue };
            match decode(&entry.key, &raw) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable record: {}", e),
            }
        }
        Ok(records)
    }
}

fn decode(key: &str, raw: &str) -> Result<JobRecord, PipelineError> {
    serde_json::from_str(raw).map_err(|e| PipelineError::RecordEncoding {
        key: key.to_string(),
        detail: e.to_string(),
    })
}

// ── Bulk wipe ────────────────────────────────────────────────────────────

/// Delete every blob listed under `dir` and flush the key-value store.
///
/// Returns the number of blobs deleted. This is an administrative operation;
/// the pipeline itself never deletes.
pub async fn wipe(
    blobs: &dyn BlobStore,
    kv: &dyn KeyValueStore,
    dir: &str,
) -> Result<usize, PipelineError> {
    let entries = blobs.list(dir).await?;
    let count = entries.len();
    try_join_all(entries.iter().map(|entry| blobs.delete(&entry.path))).await?;
    kv.flush().await?;
    info!("Wiped {} blobs and flushed the record store", count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::memory::{MemoryBlobStore, MemoryKeyValueStore};
    use super::*;
    use crate::record::{AtsFeedback, CategoryFeedback, Metadata};

    struct NoHandleStore;

    #[async_trait]
    impl BlobStore for NoHandleStore {
        async fn upload(&self, _: &str, _: &[u8]) -> Result<Option<UploadedBlob>, StoreError> {
            Ok(Some(UploadedBlob {
                path: String::new(),
            }))
        }
        async fn read(&self, _: &str) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(None)
        }
        async fn delete(&self, _: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn list(&self, _: &str) -> Result<Vec<BlobEntry>, StoreError> {
            Ok(vec![])
        }
    }

    fn feedback(score: u32) -> AnalysisFeedback {
        let category = CategoryFeedback {
            score,
            tips: vec![],
        };
        AnalysisFeedback {
            overall_score: score,
            ats: AtsFeedback {
                score,
                tips: vec![],
            },
            tone_and_style: category.clone(),
            content: category.clone(),
            structure: category.clone(),
            skills: category,
        }
    }

    fn record(id: &JobId) -> JobRecord {
        let mut metadata = Metadata::new();
        metadata.insert("jobTitle".into(), "SRE".into());
        JobRecord::new(
            id.clone(),
            ArtifactHandle::new("./a.pdf"),
            ArtifactHandle::new("./a.png"),
            metadata,
        )
    }

    #[tokio::test]
    async fn empty_handle_is_upload_failure() {
        let store = ArtifactStore::new(Arc::new(NoHandleStore));
        let err = store.store(b"%PDF", "cv.pdf").await.unwrap_err();
        assert!(matches!(err, PipelineError::UploadFailed { ref name } if name == "cv.pdf"));
    }

    #[tokio::test]
    async fn store_then_fetch_returns_same_bytes() {
        let store = ArtifactStore::new(Arc::new(MemoryBlobStore::new()));
        let handle = store.store(b"hello", "a.txt").await.unwrap();
        assert_eq!(store.fetch(&handle).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn fetch_missing_artifact_errors() {
        let store = ArtifactStore::new(Arc::new(MemoryBlobStore::new()));
        let err = store
            .fetch(&ArtifactHandle::new("./nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ArtifactMissing { .. }));
    }

    #[tokio::test]
    async fn records_use_prefixed_keys() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let records = JobRecords::new(kv.clone());
        let id = JobId::from("42");
        records.put(&id, &record(&id)).await.unwrap();

        let raw = kv.get("resume:42").await.unwrap().expect("stored under resume:42");
        assert!(raw.contains("\"feedback\":\"\""));
        assert_eq!(records.get(&id).await.unwrap(), Some(record(&id)));
    }

    #[tokio::test]
    async fn set_result_only_touches_feedback() {
        let records = JobRecords::new(Arc::new(MemoryKeyValueStore::new()));
        let id = JobId::from("1");
        records.put(&id, &record(&id)).await.unwrap();

        let updated = records.set_result(&id, feedback(90)).await.unwrap();
        assert_eq!(updated.result, Some(feedback(90)));
        assert_eq!(updated.metadata_value("jobTitle"), Some("SRE"));
        assert_eq!(records.get(&id).await.unwrap(), Some(updated));
    }

    #[tokio::test]
    async fn set_result_refuses_second_write() {
        let records = JobRecords::new(Arc::new(MemoryKeyValueStore::new()));
        let id = JobId::from("1");
        records.put(&id, &record(&id)).await.unwrap();
        records.set_result(&id, feedback(50)).await.unwrap();

        let err = records.set_result(&id, feedback(10)).await.unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyAnalyzed { .. }));
    }

    #[tokio::test]
    async fn set_result_on_unknown_id_errors() {
        let records = JobRecords::new(Arc::new(MemoryKeyValueStore::new()));
        let err = records
            .set_result(&JobId::from("missing"), feedback(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::RecordNotFound { .. }));
    }

    #[tokio::test]
    async fn list_skips_unreadable_entries() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let records = JobRecords::new(kv.clone());
        let id = JobId::from("ok");
        records.put(&id, &record(&id)).await.unwrap();
        kv.set("resume:broken", "{not json").await.unwrap();
        kv.set("other:1", "{}").await.unwrap();

        let listed = records.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
    }

    #[tokio::test]
    async fn wipe_deletes_blobs_and_flushes_records() {
        let blobs = MemoryBlobStore::new();
        let kv = MemoryKeyValueStore::new();
        blobs.upload("a.pdf", b"a").await.unwrap();
        blobs.upload("b.png", b"b").await.unwrap();
        kv.set("resume:1", "{}").await.unwrap();

        let deleted = wipe(&blobs, &kv, "./").await.unwrap();
        assert_eq!(deleted, 2);
        assert!(blobs.list("./").await.unwrap().is_empty());
        assert!(kv.list("", false).await.unwrap().is_empty());
    }
}
