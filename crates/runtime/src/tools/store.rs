//! Structured record store backends.
//!
//! The tools only ever reach records through [`RecordStore`]; the backends
//! here are an in-memory map for tests and embedding, and a directory of
//! per-collection JSON files written atomically.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::error::{ToolError, ToolResult};
use super::types::Record;

/// Storage interface consumed by the structured tools
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records of a collection in insertion order
    async fn list(&self, collection: &str) -> ToolResult<Vec<Record>>;

    async fn get(&self, collection: &str, id: &str) -> ToolResult<Option<Record>>;

    /// Insert a new record; fails if the id is already taken
    async fn insert(&self, record: Record) -> ToolResult<()>;

    /// Replace an existing record; fails with `NotFound` if absent
    async fn update(&self, record: Record) -> ToolResult<()>;
}

/// Records held in process memory
#[derive(Default)]
pub struct InMemoryRecordStore {
    collections: RwLock<HashMap<String, Vec<Record>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with records
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        {
            let mut collections = store.collections.write();
            for record in records {
                collections
                    .entry(record.collection.clone())
                    .or_default()
                    .push(record);
            }
        }
        store
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn list(&self, collection: &str) -> ToolResult<Vec<Record>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn get(&self, collection: &str, id: &str) -> ToolResult<Option<Record>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|records| records.iter().find(|r| r.id == id).cloned()))
    }

    async fn insert(&self, record: Record) -> ToolResult<()> {
        let mut collections = self.collections.write();
        let records = collections.entry(record.collection.clone()).or_default();
        if records.iter().any(|r| r.id == record.id) {
            return Err(ToolError::validation(
                format!("record {} already exists in {}", record.id, record.collection),
                vec!["id".to_string()],
            ));
        }
        records.push(record);
        Ok(())
    }

    async fn update(&self, record: Record) -> ToolResult<()> {
        let mut collections = self.collections.write();
        let slot = collections
            .get_mut(&record.collection)
            .and_then(|records| records.iter_mut().find(|r| r.id == record.id))
            .ok_or_else(|| ToolError::not_found(&record.collection, &record.id))?;
        *slot = record;
        Ok(())
    }
}

/// One `<collection>.json` array per collection under a data directory.
///
/// Every write rewrites the collection file through a temp file and an
/// atomic rename, so readers never observe a half-written file.
pub struct JsonFileRecordStore {
    dir: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileRecordStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> ToolResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            ToolError::storage(format!(
                "failed to create data directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self {
            dir,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.dir.join(format!("{collection}.json"))
    }

    async fn read_collection(&self, collection: &str) -> ToolResult<Vec<Record>> {
        let path = self.collection_path(collection);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ToolError::storage(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&raw)
            .map_err(|e| ToolError::storage(format!("failed to parse {}: {}", path.display(), e)))
    }

    async fn write_collection(&self, collection: &str, records: &[Record]) -> ToolResult<()> {
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| ToolError::storage(format!("failed to serialize {collection}: {e}")))?;
        let dir = self.dir.clone();
        let path = self.collection_path(collection);

        tokio::task::spawn_blocking(move || -> ToolResult<()> {
            use std::io::Write;

            let io_err = |e: std::io::Error| {
                ToolError::storage(format!("failed to write {}: {}", path.display(), e))
            };
            let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
            tmp.write_all(json.as_bytes()).map_err(io_err)?;
            tmp.flush().map_err(io_err)?;
            tmp.persist(&path).map_err(|e| {
                ToolError::storage(format!("failed to persist {}: {}", path.display(), e))
            })?;
            Ok(())
        })
        .await
        .map_err(|e| ToolError::storage(format!("blocking write task failed: {e}")))??;

        tracing::debug!(collection, records = records.len(), "Collection file written");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for JsonFileRecordStore {
    async fn list(&self, collection: &str) -> ToolResult<Vec<Record>> {
        self.read_collection(collection).await
    }

    async fn get(&self, collection: &str, id: &str) -> ToolResult<Option<Record>> {
        Ok(self
            .read_collection(collection)
            .await?
            .into_iter()
            .find(|r| r.id == id))
    }

    async fn insert(&self, record: Record) -> ToolResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_collection(&record.collection).await?;
        if records.iter().any(|r| r.id == record.id) {
            return Err(ToolError::validation(
                format!("record {} already exists in {}", record.id, record.collection),
                vec!["id".to_string()],
            ));
        }
        let collection = record.collection.clone();
        records.push(record);
        self.write_collection(&collection, &records).await
    }

    async fn update(&self, record: Record) -> ToolResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.read_collection(&record.collection).await?;
        let slot = records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| ToolError::not_found(&record.collection, &record.id))?;
        let collection = record.collection.clone();
        *slot = record;
        self.write_collection(&collection, &records).await
    }
}
