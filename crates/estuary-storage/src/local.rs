//! Filesystem-backed adapter for local development and multi-process use.
//!
//! [`LocalAdapter`] stores one JSON file per record under
//! `<base>/<collection>/records/`, with the collection's attributes in a
//! `schema.json` sidecar. Inserts claim the next id by creating the record
//! file with `OpenOptions::create_new(true)` — `O_CREAT | O_EXCL` on POSIX
//! — and retrying on collision. Ids are therefore dense, totally ordered,
//! and consistent with insertion arrival *across processes*, which is what
//! the lock manager needs from a shared backing store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use estuary_core::adapter::{Adapter, Capabilities};
use estuary_core::criteria::Criteria;
use estuary_core::schema::{AttributeDef, Attributes, PRIMARY_KEY};
use estuary_core::types::Record;
use estuary_core::{Result, StoreError};

use crate::filter;

/// Maximum attempts to claim an id before giving up.
const MAX_ID_RETRIES: usize = 32;

/// An [`Adapter`] backed by the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalAdapter {
    base_dir: PathBuf,
    /// Serializes read-modify-write cycles on the schema sidecars: the
    /// store applies attribute additions and removals concurrently, and
    /// interleaved rewrites of `schema.json` would drop all but one.
    schema_lock: Arc<Mutex<()>>,
}

impl LocalAdapter {
    /// Create a new `LocalAdapter` rooted at the given directory.
    ///
    /// The directory is created if it does not exist.
    pub async fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).await.map_err(|e| {
            StoreError::adapter(
                format!("Failed to create base directory: {}", base_dir.display()),
                e,
            )
        })?;
        debug!(base_dir = %base_dir.display(), "LocalAdapter initialised");
        Ok(Self {
            base_dir,
            schema_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Return the base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.base_dir.join(collection)
    }

    fn schema_path(&self, collection: &str) -> PathBuf {
        self.collection_dir(collection).join("schema.json")
    }

    fn records_dir(&self, collection: &str) -> PathBuf {
        self.collection_dir(collection).join("records")
    }

    fn record_path(&self, collection: &str, id: u64) -> PathBuf {
        self.records_dir(collection).join(format!("{id:020}.json"))
    }

    /// List all record ids in a collection, ascending.
    async fn record_ids(&self, collection: &str) -> Result<Vec<u64>> {
        let dir = self.records_dir(collection);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::CollectionNotFound {
                    name: collection.to_string(),
                })
            }
            Err(e) => {
                return Err(StoreError::adapter(
                    format!("Failed to read directory {}", dir.display()),
                    e,
                ))
            }
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            StoreError::adapter(
                format!("Failed to read directory entry in {}", dir.display()),
                e,
            )
        })? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name.strip_suffix(".json").and_then(|s| s.parse::<u64>().ok()) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Load every record in a collection, ordered by id.
    async fn load_records(&self, collection: &str) -> Result<Vec<Record>> {
        let ids = self.record_ids(collection).await?;
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let path = self.record_path(collection, id);
            match fs::read(&path).await {
                Ok(data) => {
                    let record: Record = serde_json::from_slice(&data)
                        .map_err(|e| StoreError::Serialization(e.to_string()))?;
                    records.push(record);
                }
                // A concurrent destroy may have removed it between listing
                // and reading.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(StoreError::adapter(
                        format!("Failed to read {}", path.display()),
                        e,
                    ))
                }
            }
        }
        Ok(records)
    }

    async fn write_record(&self, collection: &str, record: &Record, id: u64) -> Result<()> {
        let path = self.record_path(collection, id);
        let data = serde_json::to_vec_pretty(record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fs::write(&path, data).await.map_err(|e| {
            StoreError::adapter(format!("Failed to write {}", path.display()), e)
        })
    }

    async fn read_schema(&self, collection: &str) -> Result<Attributes> {
        self.describe(collection).await?.ok_or_else(|| {
            StoreError::CollectionNotFound {
                name: collection.to_string(),
            }
        })
    }

    async fn write_schema(&self, collection: &str, attributes: &Attributes) -> Result<()> {
        let path = self.schema_path(collection);
        let data = serde_json::to_vec_pretty(attributes)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        fs::write(&path, data).await.map_err(|e| {
            StoreError::adapter(format!("Failed to write {}", path.display()), e)
        })
    }
}

/// Create `path` exclusively with `data`. Returns `false` when the path
/// already exists (someone else claimed the id first).
async fn create_exclusive(path: PathBuf, data: Vec<u8>) -> Result<bool> {
    tokio::task::spawn_blocking(move || {
        use std::io::Write;
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                file.write_all(&data)
                    .map_err(|e| StoreError::adapter("Failed to write record file", e))?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StoreError::adapter(
                format!("Failed to create {}", path.display()),
                e,
            )),
        }
    })
    .await
    .map_err(|e| StoreError::Internal {
        message: format!("Blocking task panicked: {e}"),
    })?
}

#[async_trait]
impl Adapter for LocalAdapter {
    fn identity(&self) -> &str {
        "local"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            define: true,
            describe: true,
            drop_collection: true,
            add_attribute: true,
            remove_attribute: true,
            create: true,
            find: true,
            update: true,
            destroy: true,
            monotonic_ids: true,
            ..Capabilities::none()
        }
    }

    async fn define(&self, collection: &str, attributes: &Attributes) -> Result<()> {
        let schema_path = self.schema_path(collection);
        if fs::try_exists(&schema_path).await.unwrap_or(false) {
            return Err(StoreError::CollectionExists {
                name: collection.to_string(),
            });
        }
        let records_dir = self.records_dir(collection);
        fs::create_dir_all(&records_dir).await.map_err(|e| {
            StoreError::adapter(
                format!("Failed to create {}", records_dir.display()),
                e,
            )
        })?;
        self.write_schema(collection, attributes).await?;
        debug!(collection, "defined collection");
        Ok(())
    }

    async fn describe(&self, collection: &str) -> Result<Option<Attributes>> {
        let path = self.schema_path(collection);
        match fs::read(&path).await {
            Ok(data) => {
                let attributes: Attributes = serde_json::from_slice(&data)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                Ok(Some(attributes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::adapter(
                format!("Failed to read {}", path.display()),
                e,
            )),
        }
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        let dir = self.collection_dir(collection);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(collection, "dropped collection");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::adapter(
                format!("Failed to remove {}", dir.display()),
                e,
            )),
        }
    }

    async fn add_attribute(
        &self,
        collection: &str,
        name: &str,
        definition: &AttributeDef,
    ) -> Result<()> {
        let _guard = self.schema_lock.lock().await;
        let mut attributes = self.read_schema(collection).await?;
        attributes.insert(name.to_string(), definition.clone());
        self.write_schema(collection, &attributes).await
    }

    async fn remove_attribute(&self, collection: &str, name: &str) -> Result<()> {
        let _guard = self.schema_lock.lock().await;
        let mut attributes = self.read_schema(collection).await?;
        attributes.remove(name);
        self.write_schema(collection, &attributes).await?;

        for mut record in self.load_records(collection).await? {
            if record.remove(name).is_some() {
                if let Some(id) = record.get(PRIMARY_KEY).and_then(Value::as_u64) {
                    self.write_record(collection, &record, id).await?;
                }
            }
        }
        Ok(())
    }

    async fn create(&self, collection: &str, mut values: Record) -> Result<Record> {
        for _ in 0..MAX_ID_RETRIES {
            let next_id = self
                .record_ids(collection)
                .await?
                .last()
                .map(|id| id + 1)
                .unwrap_or(1);

            values.insert(PRIMARY_KEY.to_string(), Value::from(next_id));
            let data = serde_json::to_vec_pretty(&values)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;

            // Exclusive creation is the atomicity point: whoever wins the
            // file owns the id; losers rescan and try the next one.
            if create_exclusive(self.record_path(collection, next_id), data).await? {
                debug!(collection, id = next_id, "created record");
                return Ok(values);
            }
        }
        Err(StoreError::adapter_msg(format!(
            "Failed to claim a record id in '{collection}' after {MAX_ID_RETRIES} attempts"
        )))
    }

    async fn find(&self, collection: &str, criteria: &Criteria) -> Result<Vec<Record>> {
        let records = self.load_records(collection).await?;
        filter::apply(records, criteria)
    }

    async fn update(
        &self,
        collection: &str,
        criteria: &Criteria,
        values: Record,
    ) -> Result<Vec<Record>> {
        let mut updated = Vec::new();
        for mut record in self.load_records(collection).await? {
            if filter::matches(&record, criteria)? {
                for (key, value) in &values {
                    record.insert(key.clone(), value.clone());
                }
                if let Some(id) = record.get(PRIMARY_KEY).and_then(Value::as_u64) {
                    self.write_record(collection, &record, id).await?;
                }
                updated.push(record);
            }
        }
        debug!(collection, updated = updated.len(), "updated records");
        Ok(updated)
    }

    async fn destroy(&self, collection: &str, criteria: &Criteria) -> Result<()> {
        let mut destroyed = 0usize;
        for record in self.load_records(collection).await? {
            if filter::matches(&record, criteria)? {
                if let Some(id) = record.get(PRIMARY_KEY).and_then(Value::as_u64) {
                    let path = self.record_path(collection, id);
                    match fs::remove_file(&path).await {
                        Ok(()) => destroyed += 1,
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => {
                            return Err(StoreError::adapter(
                                format!("Failed to delete {}", path.display()),
                                e,
                            ))
                        }
                    }
                }
            }
        }
        debug!(collection, destroyed, "destroyed records");
        Ok(())
    }
}
