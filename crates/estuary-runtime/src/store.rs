//! The store facade: a full collection API over a partial adapter.
//!
//! A [`Store`] wraps one [`Adapter`] and exposes the complete surface —
//! DDL (`define`/`describe`/`alter`/`drop_collection`), DQL
//! (`create`/`find`/`update`/`destroy`/`count`) and the compound operations
//! (`find_or_create`, `create_each`, `find_or_create_each`). Wherever the
//! adapter implements an operation natively the store delegates; otherwise
//! it fills in a default built from the operations the adapter does have.
//! Capabilities are read once at construction and dispatch is decided on
//! that snapshot.
//!
//! Criteria are normalized at this boundary; a normalization error is
//! reported to the caller and the adapter is never reached. Timestamps are
//! stamped here, not in adapters. Compound operations that need atomicity
//! are serialized through the [`LockManager`] and the reserved transaction
//! collection.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::try_join_all;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use estuary_core::adapter::{Adapter, Capabilities};
use estuary_core::config::StoreConfig;
use estuary_core::criteria::{Criteria, CriteriaInput};
use estuary_core::schema::{augment, Attributes, DeclaredAttributes, SchemaDiff, CREATED_AT, UPDATED_AT};
use estuary_core::types::Record;
use estuary_core::{Result, StoreError};

use crate::lock::{reserved_attributes, LockManager};

/// The facade exposed to callers; fills gaps in the adapter with defaults.
pub struct Store {
    adapter: Arc<dyn Adapter>,
    capabilities: Capabilities,
    config: StoreConfig,
    locks: LockManager,
}

impl Store {
    /// Create a store over an adapter.
    pub fn new(adapter: Arc<dyn Adapter>, config: StoreConfig) -> Self {
        let capabilities = adapter.capabilities();
        let locks = LockManager::new(&config);
        Self {
            adapter,
            capabilities,
            config,
            locks,
        }
    }

    /// The adapter's capability snapshot taken at construction.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// The adapter's identity string.
    pub fn adapter_identity(&self) -> &str {
        self.adapter.identity()
    }

    /// The store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Collection names are case-insensitive; adapters see the folded form.
    fn fold(name: &str) -> String {
        name.to_lowercase()
    }

    fn timestamp() -> Value {
        json!(Utc::now())
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Run once before using the store. Forwards to the adapter when it has
    /// an initializer, then makes sure the reserved transaction collection
    /// exists so compound operations can take locks.
    pub async fn initialize(&self) -> Result<()> {
        if self.capabilities.initialize {
            self.adapter.initialize().await?;
        }

        let reserved = self.locks.collection().to_string();
        if self.describe(&reserved).await?.is_none() {
            match self.define(&reserved, &reserved_attributes()).await {
                Ok(_) => info!(collection = %reserved, "created transaction collection"),
                // Another process created it between describe and define.
                Err(StoreError::CollectionExists { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Symmetric to [`initialize`](Store::initialize).
    pub async fn teardown(&self) -> Result<()> {
        if self.capabilities.teardown {
            self.adapter.teardown().await?;
        }
        Ok(())
    }

    /// Per-collection setup hook; no-op when the adapter has none.
    pub async fn initialize_collection(&self, name: &str) -> Result<()> {
        if self.capabilities.initialize_collection {
            self.adapter.initialize_collection(&Self::fold(name)).await?;
        }
        Ok(())
    }

    /// Per-collection teardown hook; no-op when the adapter has none.
    pub async fn teardown_collection(&self, name: &str) -> Result<()> {
        if self.capabilities.teardown_collection {
            self.adapter.teardown_collection(&Self::fold(name)).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // DDL
    // -----------------------------------------------------------------------

    /// Create a collection. The declaration is augmented (implicit primary
    /// key, timestamp attributes) before the adapter sees it. Returns the
    /// augmented attribute set.
    pub async fn define(
        &self,
        name: &str,
        declared: &DeclaredAttributes,
    ) -> Result<Attributes> {
        let name = Self::fold(name);
        let attributes = augment(declared, &self.config);

        if self.describe(&name).await?.is_some() {
            return Err(StoreError::CollectionExists { name });
        }
        if self.capabilities.define {
            self.adapter.define(&name, &attributes).await?;
        }
        debug!(collection = %name, "defined collection");
        Ok(attributes)
    }

    /// Return a collection's attributes, or `None` when it does not exist.
    pub async fn describe(&self, name: &str) -> Result<Option<Attributes>> {
        if self.capabilities.describe {
            self.adapter.describe(&Self::fold(name)).await
        } else {
            Ok(None)
        }
    }

    /// Remove a collection and its records.
    pub async fn drop_collection(&self, name: &str) -> Result<()> {
        if !self.capabilities.drop_collection {
            return Err(self.adapter.missing_operation("drop_collection"));
        }
        self.adapter.drop_collection(&Self::fold(name)).await
    }

    /// Evolve a collection to the (augmented) target attribute set.
    ///
    /// Prefers the adapter's native `alter`. Failing that, and when the
    /// adapter can add and remove individual attributes, the diff is
    /// applied: all additions concurrently, then all removals concurrently
    /// — a changed attribute appears in both phases. An adapter with
    /// neither path gets a no-op: guessing how to evolve a schema risks
    /// losing data.
    pub async fn alter(&self, name: &str, declared: &DeclaredAttributes) -> Result<()> {
        let name = Self::fold(name);
        let target = augment(declared, &self.config);

        if self.capabilities.alter {
            return self.adapter.alter(&name, &target).await;
        }

        if self.capabilities.add_attribute && self.capabilities.remove_attribute {
            let current = self
                .describe(&name)
                .await?
                .ok_or_else(|| StoreError::CollectionNotFound { name: name.clone() })?;
            let diff = SchemaDiff::between(&current, &target);

            try_join_all(
                diff.added
                    .iter()
                    .map(|(attr, def)| self.adapter.add_attribute(&name, attr, def)),
            )
            .await?;
            try_join_all(
                diff.removed
                    .keys()
                    .map(|attr| self.adapter.remove_attribute(&name, attr)),
            )
            .await?;

            debug!(
                collection = %name,
                added = diff.added.len(),
                removed = diff.removed.len(),
                "altered collection"
            );
            return Ok(());
        }

        debug!(collection = %name, "adapter cannot alter; schema left untouched");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // DQL
    // -----------------------------------------------------------------------

    /// Insert a record. Timestamps are stamped here before the adapter is
    /// called; no validation happens at this layer.
    pub async fn create(&self, name: &str, mut values: Record) -> Result<Record> {
        if !self.capabilities.create {
            return Err(self.adapter.missing_operation("create"));
        }
        let now = Self::timestamp();
        if self.config.created_at {
            values.insert(CREATED_AT.to_string(), now.clone());
        }
        if self.config.updated_at {
            values.insert(UPDATED_AT.to_string(), now);
        }
        self.adapter.create(&Self::fold(name), values).await
    }

    /// Return all records matching the criteria.
    pub async fn find_all(
        &self,
        name: &str,
        criteria: impl Into<CriteriaInput>,
    ) -> Result<Vec<Record>> {
        let criteria = Criteria::normalize(criteria)?;
        if !self.capabilities.find {
            return Err(self.adapter.missing_operation("find"));
        }
        self.adapter.find(&Self::fold(name), &criteria).await
    }

    /// Return the single record matching the criteria.
    ///
    /// Absent criteria default to `limit 1`. An empty result is `Ok(None)`;
    /// more than one match is an error — this selector never silently picks
    /// one of many.
    pub async fn find(
        &self,
        name: &str,
        criteria: impl Into<CriteriaInput>,
    ) -> Result<Option<Record>> {
        let criteria = match criteria.into() {
            CriteriaInput::None | CriteriaInput::Json(Value::Null) => Criteria {
                limit: Some(1),
                ..Default::default()
            },
            other => Criteria::normalize(other)?,
        };

        let mut records = self.find_all(name, criteria).await?;
        match records.len() {
            0 => Ok(None),
            1 => Ok(records.pop()),
            matched => Err(StoreError::AmbiguousMatch {
                collection: Self::fold(name),
                matched,
            }),
        }
    }

    /// Count records matching the criteria, natively or by fetching.
    pub async fn count(&self, name: &str, criteria: impl Into<CriteriaInput>) -> Result<u64> {
        let criteria = Criteria::normalize(criteria)?;
        if self.capabilities.count {
            self.adapter.count(&Self::fold(name), &criteria).await
        } else {
            Ok(self.find_all(name, criteria).await?.len() as u64)
        }
    }

    /// Merge `values` into every matching record; `updated_at` is stamped
    /// when enabled. Returns the updated records.
    pub async fn update(
        &self,
        name: &str,
        criteria: impl Into<CriteriaInput>,
        mut values: Record,
    ) -> Result<Vec<Record>> {
        let criteria = Criteria::normalize(criteria)?;
        if !self.capabilities.update {
            return Err(self.adapter.missing_operation("update"));
        }
        if self.config.updated_at {
            values.insert(UPDATED_AT.to_string(), Self::timestamp());
        }
        self.adapter
            .update(&Self::fold(name), &criteria, values)
            .await
    }

    /// Delete every matching record.
    pub async fn destroy(&self, name: &str, criteria: impl Into<CriteriaInput>) -> Result<()> {
        let criteria = Criteria::normalize(criteria)?;
        if !self.capabilities.destroy {
            return Err(self.adapter.missing_operation("destroy"));
        }
        self.adapter.destroy(&Self::fold(name), &criteria).await
    }

    /// Association stub: forwards when the adapter has native join support.
    pub async fn join(&self, name: &str, criteria: impl Into<CriteriaInput>) -> Result<Vec<Record>> {
        let criteria = Criteria::normalize(criteria)?;
        if !self.capabilities.join {
            return Err(self.adapter.missing_operation("join"));
        }
        self.adapter.join(&Self::fold(name), &criteria).await
    }

    // -----------------------------------------------------------------------
    // Compound operations
    // -----------------------------------------------------------------------

    /// Return the first record matching `criteria`, creating one when none
    /// matches.
    ///
    /// With `values` omitted the where clause doubles as the values. On
    /// adapters without a native implementation the find-then-create
    /// sequence runs inside a named lock, so concurrent calls against one
    /// collection cannot interleave.
    pub async fn find_or_create(
        &self,
        name: &str,
        criteria: impl Into<CriteriaInput>,
        values: Option<Record>,
    ) -> Result<Record> {
        let name = Self::fold(name);
        let criteria = Criteria::normalize(criteria)?;
        let values = match values {
            Some(values) => values,
            None => criteria.where_clause.clone().unwrap_or_default(),
        };

        if self.capabilities.find_or_create {
            return self
                .adapter
                .find_or_create(&name, &criteria, values)
                .await;
        }

        let lock_name = format!("{name}.default.find_or_create");
        self.locks
            .with_lock(self, &lock_name, || async {
                if let Some(existing) = self.find(&name, criteria.clone()).await? {
                    return Ok(existing);
                }
                self.create(&name, values).await
            })
            .await
    }

    /// Insert a batch of records.
    ///
    /// The default runs the inserts sequentially inside a named lock so a
    /// duplicate-prone batch cannot interleave with concurrent writers; the
    /// first failure aborts the remainder of the batch.
    pub async fn create_each(&self, name: &str, values_list: Vec<Record>) -> Result<Vec<Record>> {
        let name = Self::fold(name);
        if self.capabilities.create_each {
            return self.adapter.create_each(&name, values_list).await;
        }
        if !self.capabilities.create {
            return Err(self.adapter.missing_operation("create"));
        }

        let lock_name = format!("{name}.default.create_each");
        self.locks
            .with_lock(self, &lock_name, || async move {
                let mut created = Vec::with_capacity(values_list.len());
                for values in values_list {
                    created.push(self.create(&name, values).await?);
                }
                Ok(created)
            })
            .await
    }

    /// Find-or-create each element of a batch, matching on the values of
    /// `attrs_to_check`.
    pub async fn find_or_create_each(
        &self,
        name: &str,
        attrs_to_check: &[String],
        values_list: Vec<Record>,
    ) -> Result<Vec<Record>> {
        let name = Self::fold(name);
        if self.capabilities.find_or_create_each {
            return self
                .adapter
                .find_or_create_each(&name, attrs_to_check, values_list)
                .await;
        }

        let lock_name = format!("{name}.default.find_or_create_each");
        self.locks
            .with_lock(self, &lock_name, || async move {
                let mut results = Vec::with_capacity(values_list.len());
                for values in values_list {
                    let mut where_clause = Map::new();
                    for attr in attrs_to_check {
                        if let Some(value) = values.get(attr) {
                            where_clause.insert(attr.clone(), value.clone());
                        }
                    }
                    let criteria = Criteria::with_where(where_clause);
                    results.push(self.find_or_create(&name, criteria, Some(values)).await?);
                }
                Ok(results)
            })
            .await
    }

    // -----------------------------------------------------------------------
    // Locking
    // -----------------------------------------------------------------------

    /// Run `critical` while holding the named app-level lock. See
    /// [`LockManager::with_lock`].
    pub async fn transaction<T, F, Fut>(&self, name: &str, critical: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.locks.with_lock(self, name, critical).await
    }

    /// Delete lock entries older than `max_age`. See
    /// [`LockManager::reap_stale`].
    pub async fn reap_stale_locks(&self, max_age: Duration) -> Result<usize> {
        self.locks.reap_stale(self, max_age).await
    }
}
