//! In-process adapter backed by a mutex-guarded map.
//!
//! [`MemoryAdapter`] is the reference adapter: every collection is a vector
//! of records behind one mutex, and primary-key ids come from a
//! per-collection counter incremented under that mutex — which makes id
//! assignment a total order consistent with insertion arrival, the property
//! the lock manager depends on.
//!
//! It deliberately implements no compound operations and no native `alter`,
//! so the store's defaults are exercised against it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use estuary_core::adapter::{Adapter, Capabilities};
use estuary_core::criteria::Criteria;
use estuary_core::schema::{AttributeDef, Attributes, PRIMARY_KEY};
use estuary_core::types::Record;
use estuary_core::{Result, StoreError};

use crate::filter;

struct Collection {
    attributes: Attributes,
    records: Vec<Record>,
    next_id: u64,
}

/// An [`Adapter`] holding all collections in process memory.
#[derive(Default)]
pub struct MemoryAdapter {
    collections: Mutex<HashMap<String, Collection>>,
}

impl MemoryAdapter {
    /// Create an empty adapter.
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> Result<MutexGuard<'_, HashMap<String, Collection>>> {
        self.collections.lock().map_err(|_| StoreError::Internal {
            message: "collection table poisoned".to_string(),
        })
    }
}

fn missing_collection(name: &str) -> StoreError {
    StoreError::CollectionNotFound {
        name: name.to_string(),
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn identity(&self) -> &str {
        "memory"
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
            count: true,
            update: true,
            destroy: true,
            monotonic_ids: true,
            ..Capabilities::none()
        }
    }

    async fn define(&self, collection: &str, attributes: &Attributes) -> Result<()> {
        let mut table = self.table()?;
        if table.contains_key(collection) {
            return Err(StoreError::CollectionExists {
                name: collection.to_string(),
            });
        }
        table.insert(
            collection.to_string(),
            Collection {
                attributes: attributes.clone(),
                records: Vec::new(),
                next_id: 1,
            },
        );
        debug!(collection, "defined collection");
        Ok(())
    }

    async fn describe(&self, collection: &str) -> Result<Option<Attributes>> {
        let table = self.table()?;
        Ok(table.get(collection).map(|c| c.attributes.clone()))
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        let mut table = self.table()?;
        if table.remove(collection).is_some() {
            debug!(collection, "dropped collection");
        }
        Ok(())
    }

    async fn add_attribute(
        &self,
        collection: &str,
        name: &str,
        definition: &AttributeDef,
    ) -> Result<()> {
        let mut table = self.table()?;
        let entry = table
            .get_mut(collection)
            .ok_or_else(|| missing_collection(collection))?;
        entry
            .attributes
            .insert(name.to_string(), definition.clone());
        Ok(())
    }

    async fn remove_attribute(&self, collection: &str, name: &str) -> Result<()> {
        let mut table = self.table()?;
        let entry = table
            .get_mut(collection)
            .ok_or_else(|| missing_collection(collection))?;
        entry.attributes.remove(name);
        for record in &mut entry.records {
            record.remove(name);
        }
        Ok(())
    }

    async fn create(&self, collection: &str, mut values: Record) -> Result<Record> {
        let mut table = self.table()?;
        let entry = table
            .get_mut(collection)
            .ok_or_else(|| missing_collection(collection))?;

        // The primary key is always adapter-assigned; caller-provided ids
        // would break the monotonic-ids guarantee.
        let id = entry.next_id;
        entry.next_id += 1;
        values.insert(PRIMARY_KEY.to_string(), Value::from(id));

        entry.records.push(values.clone());
        debug!(collection, id, "created record");
        Ok(values)
    }

    async fn find(&self, collection: &str, criteria: &Criteria) -> Result<Vec<Record>> {
        let records = {
            let table = self.table()?;
            table
                .get(collection)
                .ok_or_else(|| missing_collection(collection))?
                .records
                .clone()
        };
        filter::apply(records, criteria)
    }

    async fn count(&self, collection: &str, criteria: &Criteria) -> Result<u64> {
        let table = self.table()?;
        let entry = table
            .get(collection)
            .ok_or_else(|| missing_collection(collection))?;
        let mut count = 0u64;
        for record in &entry.records {
            if filter::matches(record, criteria)? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn update(
        &self,
        collection: &str,
        criteria: &Criteria,
        values: Record,
    ) -> Result<Vec<Record>> {
        let mut table = self.table()?;
        let entry = table
            .get_mut(collection)
            .ok_or_else(|| missing_collection(collection))?;

        let mut updated = Vec::new();
        for record in &mut entry.records {
            if filter::matches(record, criteria)? {
                for (key, value) in &values {
                    record.insert(key.clone(), value.clone());
                }
                updated.push(record.clone());
            }
        }
        debug!(collection, updated = updated.len(), "updated records");
        Ok(updated)
    }

    async fn destroy(&self, collection: &str, criteria: &Criteria) -> Result<()> {
        let mut table = self.table()?;
        let entry = table
            .get_mut(collection)
            .ok_or_else(|| missing_collection(collection))?;

        let mut kept = Vec::with_capacity(entry.records.len());
        let mut destroyed = 0usize;
        for record in entry.records.drain(..) {
            if filter::matches(&record, criteria)? {
                destroyed += 1;
            } else {
                kept.push(record);
            }
        }
        entry.records = kept;
        debug!(collection, destroyed, "destroyed records");
        Ok(())
    }
}
