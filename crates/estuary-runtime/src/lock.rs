//! App-level named locks over the reserved transaction collection.
//!
//! A lock is a row: `{uuid, name}` plus the adapter-assigned monotonic `id`.
//! Ownership of `name` belongs to the entry with the smallest `id` among
//! entries carrying that name. Acquisition enqueues an entry and rescans
//! until no older entry with the same name exists; release deletes the
//! entry and wakes the next in-process waiter. Waiters in other processes
//! notice on their own next poll — the shared collection is the only
//! coordination channel, so any set of processes sharing one backing store
//! can serialize named critical sections.
//!
//! Fairness is FIFO by `id` per name. A critical section that never
//! completes leaks its entry and blocks the name; see
//! [`LockManager::reap_stale`] for explicit recovery.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use estuary_core::config::StoreConfig;
use estuary_core::schema::{AttributeDef, AttributeType, DeclaredAttributes};
use estuary_core::types::Record;
use estuary_core::{Result, StoreError};

use crate::store::Store;

/// A row in the reserved transaction collection.
#[derive(Debug, Clone, Deserialize)]
pub struct LockEntry {
    /// Adapter-assigned insertion id; the queue order.
    pub id: u64,
    /// Globally unique identity of this entry.
    pub uuid: String,
    /// The critical-section key.
    pub name: String,
    /// When the entry was enqueued (present when timestamps are enabled).
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// The attribute declaration for the reserved transaction collection.
///
/// The primary key is injected by augmenting, like any other collection.
pub fn reserved_attributes() -> DeclaredAttributes {
    [
        (
            "uuid".to_string(),
            AttributeDef::of(AttributeType::String).unique().into(),
        ),
        (
            "name".to_string(),
            AttributeDef::of(AttributeType::String).required().into(),
        ),
    ]
    .into()
}

/// Named, FIFO, store-backed mutual exclusion.
pub struct LockManager {
    collection: String,
    warn_after: Duration,
    poll_interval: Duration,
    /// uuid → wakeup handle for waiters in this process.
    waiters: Mutex<HashMap<String, Arc<Notify>>>,
}

impl LockManager {
    /// Create a lock manager from the store configuration.
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            collection: config.transaction_collection.clone(),
            warn_after: config.transaction_warning_after,
            poll_interval: config.lock_poll_interval,
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Name of the reserved collection this manager operates on.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn waiters(&self) -> Result<MutexGuard<'_, HashMap<String, Arc<Notify>>>> {
        self.waiters.lock().map_err(|_| StoreError::Internal {
            message: "lock waiter table poisoned".to_string(),
        })
    }

    /// Read and parse all lock entries. Rows that do not parse are skipped
    /// with a warning; they cannot participate in ordering.
    async fn entries(&self, store: &Store) -> Result<Vec<LockEntry>> {
        let records = store.find_all(&self.collection, ()).await?;
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_value::<LockEntry>(Value::Object(record)) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(collection = %self.collection, error = %e, "skipping unparsable lock entry");
                }
            }
        }
        Ok(entries)
    }

    /// Run `critical` while holding exclusive ownership of `name` across
    /// every process sharing the transaction collection.
    ///
    /// The closure is invoked at most once, only after acquisition. Its
    /// output is returned to the caller after the lock entry has been
    /// deleted, so cleanup at the call site cannot starve the queue. A
    /// critical section outliving the configured warning threshold logs a
    /// diagnostic but is never aborted.
    pub async fn with_lock<T, F, Fut>(&self, store: &Store, name: &str, critical: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !store.capabilities().monotonic_ids {
            return Err(StoreError::Lock {
                name: name.to_string(),
                message: format!(
                    "adapter '{}' does not guarantee monotonic id assignment",
                    store.adapter_identity()
                ),
            });
        }

        // Enqueue. The adapter assigns the ordering id on insert; a failure
        // here means the critical section never runs.
        let uuid = Uuid::new_v4().to_string();
        let mut entry = Record::new();
        entry.insert("uuid".to_string(), Value::String(uuid.clone()));
        entry.insert("name".to_string(), Value::String(name.to_string()));
        let created = store.create(&self.collection, entry).await?;
        let my_id = created
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| StoreError::Lock {
                name: name.to_string(),
                message: "adapter did not assign an insertion id".to_string(),
            })?;

        // Register for in-process promotion before the first scan: a release
        // that lands between our scan and our wait leaves a stored permit.
        let notify = Arc::new(Notify::new());
        self.waiters()?.insert(uuid.clone(), notify.clone());

        if let Err(e) = self.wait_until_owned(store, name, &uuid, my_id, &notify).await {
            let _ = self.waiters().map(|mut w| w.remove(&uuid));
            // Best effort: do not leave the failed entry blocking the name.
            if let Err(cleanup) = store.destroy(&self.collection, json!({"uuid": uuid})).await {
                warn!(name, error = %cleanup, "failed to withdraw lock entry after scan error");
            }
            return Err(e);
        }
        self.waiters()?.remove(&uuid);

        debug!(name, id = my_id, "lock acquired");

        let warn_handle = tokio::spawn({
            let name = name.to_string();
            let after = self.warn_after;
            async move {
                tokio::time::sleep(after).await;
                warn!(
                    name = %name,
                    threshold_ms = after.as_millis() as u64,
                    "critical section still holding lock past warning threshold"
                );
            }
        });

        let outcome = critical().await;

        warn_handle.abort();

        match (outcome, self.release(store, name, &uuid).await) {
            (Ok(value), Ok(())) => Ok(value),
            // The critical section succeeded but release failed: the caller
            // must hear about it — the entry may still block the name.
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release_err)) => {
                warn!(name, error = %release_err, "lock release failed after critical-section error");
                Err(e)
            }
        }
    }

    /// Rescan until no entry with the same name and a smaller id exists.
    async fn wait_until_owned(
        &self,
        store: &Store,
        name: &str,
        uuid: &str,
        my_id: u64,
        notify: &Notify,
    ) -> Result<()> {
        loop {
            let entries = self.entries(store).await?;
            let conflict = entries
                .iter()
                .any(|e| e.name == name && e.uuid != uuid && e.id < my_id);
            if !conflict {
                return Ok(());
            }
            debug!(name, id = my_id, "lock queued; waiting");
            tokio::select! {
                _ = notify.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Delete the holder's entry and wake the next in-process waiter.
    ///
    /// The entry is deleted before anyone is woken, so the next holder can
    /// only observe an empty slot. Promotion is a courtesy for waiters in
    /// this process; others notice on their own next poll.
    async fn release(&self, store: &Store, name: &str, uuid: &str) -> Result<()> {
        let entries = self.entries(store).await?;
        let next = entries
            .iter()
            .filter(|e| e.name == name && e.uuid != uuid)
            .min_by_key(|e| e.id)
            .cloned();

        store
            .destroy(&self.collection, json!({"uuid": uuid}))
            .await?;
        debug!(name, "lock released");

        if let Some(next) = next {
            if let Some(waiter) = self.waiters()?.get(&next.uuid) {
                waiter.notify_one();
            }
        }
        Ok(())
    }

    /// Delete lock entries older than `max_age`.
    ///
    /// Recovery tool for holders that died mid-section; never invoked
    /// automatically. Returns the number of entries deleted.
    pub async fn reap_stale(&self, store: &Store, max_age: Duration) -> Result<usize> {
        let now = Utc::now();
        let mut reaped = 0;
        for entry in self.entries(store).await? {
            let Some(created_at) = entry.created_at else {
                continue;
            };
            let age = now
                .signed_duration_since(created_at)
                .to_std()
                .unwrap_or(Duration::ZERO);
            if age > max_age {
                store
                    .destroy(&self.collection, json!({"uuid": entry.uuid}))
                    .await?;
                reaped += 1;
                info!(
                    name = %entry.name,
                    age_secs = age.as_secs(),
                    "reaped stale lock entry"
                );
            }
        }
        Ok(reaped)
    }
}
