//! File-backed record store
//!
//! Each study's records live in one JSON document:
//! - `{base_path}/{study-id}.json` - identifier -> record, ordered by identifier
//!
//! Every mutation is a locked read-modify-write of that document: take an
//! exclusive lock, read, apply the change, write a temp file, rename it over
//! the original. Readers never lock; the rename means they always see a whole
//! document.
//!
//! # Concurrency
//!
//! Writers in one process are serialized by an in-process mutex. On Unix an
//! OS-level lock (`libc::flock`) on `{study-id}.json.lock` additionally
//! serializes writers across processes sharing the directory. Conditional
//! writes evaluate their condition inside that critical section, so they are
//! linearizable per study for every process on the same host.
//!
//! Networked filesystems may not honor `flock`; use a store with native
//! conditional writes (DynamoDB) when writers span machines.

use crate::memory::{scan, Partition};
use async_trait::async_trait;
use extid_core::{
    BatchFailure, Condition, ExternalIdRecord, PutOutcome, RecordKey, RecordQuery, RecordStore,
    Result, StoreError,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
#[cfg(unix)]
use std::fs::OpenOptions;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// On-disk document for one study
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudyFile {
    study_id: String,
    records: Partition,
}

/// What a locked update decided
enum Swap<R> {
    /// Persist the modified document and return `R`
    Write(R),
    /// Leave the document untouched and return `R`
    Keep(R),
}

#[cfg(unix)]
struct FlockGuard {
    file: std::fs::File,
}

#[cfg(unix)]
impl FlockGuard {
    fn lock_exclusive(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)?;

        let fd = file.as_raw_fd();
        let rc = unsafe { libc::flock(fd, libc::LOCK_EX) };
        if rc != 0 {
            return Err(StoreError::io(format!(
                "Failed to acquire file lock on {:?}",
                path
            )));
        }

        Ok(Self { file })
    }
}

#[cfg(unix)]
impl Drop for FlockGuard {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
    }
}

/// Record store persisting one JSON document per study under a directory
#[derive(Clone)]
pub struct FileRecordStore {
    base_path: PathBuf,
    /// Serializes writers within this process
    write_lock: Arc<Mutex<()>>,
}

impl Debug for FileRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRecordStore")
            .field("base_path", &self.base_path)
            .finish()
    }
}

/// Encode a study id into a safe file stem.
///
/// ASCII alphanumerics, `-` and `_` pass through; every other byte becomes `%XX`.
fn encode_file_stem(study_id: &str) -> String {
    let mut out = String::with_capacity(study_id.len());
    for byte in study_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn sibling_path(path: &Path, suffix: &str) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| StoreError::io("Invalid file name"))?;
    Ok(path.with_file_name(format!("{}{}", file_name, suffix)))
}

fn read_study_blocking(path: &Path) -> Result<Option<StudyFile>> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(Some(serde_json::from_str(&s)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_study_blocking(path: &Path, study: &StudyFile) -> Result<()> {
    if study.records.is_empty() {
        return match std::fs::remove_file(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        };
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        sibling_path(path, &format!(".tmp.{}.{}", std::process::id(), nanos))?
    };

    let content = serde_json::to_string_pretty(study)?;
    {
        let mut f = std::fs::File::create(&tmp_path)?;
        f.write_all(content.as_bytes())?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

impl FileRecordStore {
    /// Create a store rooted at `base_path`. The directory is created lazily.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn study_path(&self, study_id: &str) -> PathBuf {
        self.base_path
            .join(format!("{}.json", encode_file_stem(study_id)))
    }

    async fn read_partition(&self, study_id: &str) -> Result<Partition> {
        let path = self.study_path(study_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Partition::new()),
            Err(e) => {
                return Err(StoreError::io(format!("Failed to read {:?}: {}", path, e)));
            }
        };
        let study: StudyFile = serde_json::from_str(&content)?;
        Ok(study.records)
    }

    /// Atomically update one study's document under the write locks.
    async fn swap_study<R, F>(&self, study_id: &str, update: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Partition) -> Swap<R> + Send + 'static,
    {
        let path = self.study_path(study_id);
        let study_id = study_id.to_string();
        let write_lock = Arc::clone(&self.write_lock);

        tokio::task::spawn_blocking(move || -> Result<R> {
            let _local = write_lock.lock();
            #[cfg(unix)]
            let _guard = FlockGuard::lock_exclusive(&sibling_path(&path, ".lock")?)?;

            let mut study = read_study_blocking(&path)?.unwrap_or_else(|| StudyFile {
                study_id,
                records: Partition::new(),
            });

            match update(&mut study.records) {
                Swap::Keep(out) => Ok(out),
                Swap::Write(out) => {
                    write_study_blocking(&path, &study)?;
                    Ok(out)
                }
            }
        })
        .await
        .map_err(|e| StoreError::io(format!("Join error in swap_study: {}", e)))?
    }
}

fn group_by_study<T: Clone>(
    items: &[T],
    study_of: impl Fn(&T) -> &str,
) -> BTreeMap<String, Vec<T>> {
    let mut groups: BTreeMap<String, Vec<T>> = BTreeMap::new();
    for item in items {
        groups
            .entry(study_of(item).to_string())
            .or_default()
            .push(item.clone());
    }
    groups
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<ExternalIdRecord>> {
        let mut partition = self.read_partition(&key.study_id).await?;
        Ok(partition.remove(&key.identifier))
    }

    async fn put_if(&self, record: &ExternalIdRecord, expected: &Condition) -> Result<PutOutcome> {
        let record = record.clone();
        let expected = expected.clone();
        let study_id = record.study_id.clone();
        self.swap_study(&study_id, move |partition| {
            if !expected.matches(partition.get(&record.identifier)) {
                return Swap::Keep(PutOutcome::ConditionFailed);
            }
            partition.insert(record.identifier.clone(), record);
            Swap::Write(PutOutcome::Written)
        })
        .await
    }

    async fn put(&self, record: &ExternalIdRecord) -> Result<()> {
        let record = record.clone();
        let study_id = record.study_id.clone();
        self.swap_study(&study_id, move |partition| {
            partition.insert(record.identifier.clone(), record);
            Swap::Write(())
        })
        .await
    }

    async fn delete(&self, key: &RecordKey) -> Result<()> {
        let identifier = key.identifier.clone();
        self.swap_study(&key.study_id, move |partition| {
            match partition.remove(&identifier) {
                Some(_) => Swap::Write(()),
                None => Swap::Keep(()),
            }
        })
        .await
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<ExternalIdRecord>> {
        let partition = self.read_partition(&query.study_id).await?;
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(scan(&partition, query).take(limit).cloned().collect())
    }

    async fn count(&self, query: &RecordQuery) -> Result<usize> {
        let partition = self.read_partition(&query.study_id).await?;
        Ok(partition.values().filter(|r| query.admits(r)).count())
    }

    async fn batch_put(&self, records: &[ExternalIdRecord]) -> Result<Vec<BatchFailure>> {
        for (study_id, records) in group_by_study(records, |r| r.study_id.as_str()) {
            self.swap_study(&study_id, move |partition| {
                for record in records {
                    partition.insert(record.identifier.clone(), record);
                }
                Swap::Write(())
            })
            .await?;
        }
        Ok(Vec::new())
    }

    async fn batch_delete(&self, keys: &[RecordKey]) -> Result<Vec<BatchFailure>> {
        for (study_id, keys) in group_by_study(keys, |k| k.study_id.as_str()) {
            self.swap_study(&study_id, move |partition| {
                let before = partition.len();
                for key in &keys {
                    partition.remove(&key.identifier);
                }
                if partition.len() == before {
                    Swap::Keep(())
                } else {
                    Swap::Write(())
                }
            })
            .await?;
        }
        Ok(Vec::new())
    }
}
