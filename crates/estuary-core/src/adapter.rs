//! The Adapter trait — the seam between the store and a backing store.
//!
//! An adapter implements whatever subset of the operations its backend can
//! support and reports that subset through [`Capabilities`]. The store
//! fills the gaps with defaults: schema diffing for `alter`, loop-based
//! `create_each`, transactional `find_or_create`. Implementations must be
//! `Send + Sync` for use across async tasks, and are consumed as
//! `Arc<dyn Adapter>`.
//!
//! Every operation has a default body that fails with
//! [`StoreError::MissingOperation`]; an adapter only overrides what it
//! supports. `capabilities()` must agree with the overridden set — the
//! store memoizes it once at construction and dispatches on it.

use async_trait::async_trait;

use crate::criteria::Criteria;
use crate::error::StoreError;
use crate::schema::{AttributeDef, Attributes};
use crate::types::Record;
use crate::Result;

/// The operations an adapter implements natively.
///
/// One flag per recognized operation, plus `monotonic_ids`: whether the
/// adapter assigns primary-key ids in a total order consistent with
/// insertion arrival. The lock manager requires that property.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub initialize: bool,
    pub initialize_collection: bool,
    pub teardown: bool,
    pub teardown_collection: bool,
    pub define: bool,
    pub describe: bool,
    pub drop_collection: bool,
    pub alter: bool,
    pub add_attribute: bool,
    pub remove_attribute: bool,
    pub create: bool,
    pub find: bool,
    pub count: bool,
    pub update: bool,
    pub destroy: bool,
    pub find_or_create: bool,
    pub create_each: bool,
    pub find_or_create_each: bool,
    pub join: bool,
    pub monotonic_ids: bool,
}

impl Capabilities {
    /// No native operations at all.
    pub fn none() -> Self {
        Self::default()
    }
}

/// The interface a backing store exposes to the store facade.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Adapter name, used in diagnostics and error messages.
    fn identity(&self) -> &str;

    /// Which operations this adapter implements natively.
    ///
    /// The default claims nothing; override together with the operations.
    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
    }

    /// One-time setup, run once per store.
    async fn initialize(&self) -> Result<()> {
        Err(self.missing_operation("initialize"))
    }

    /// One-time teardown.
    async fn teardown(&self) -> Result<()> {
        Err(self.missing_operation("teardown"))
    }

    /// Per-collection setup hook.
    async fn initialize_collection(&self, collection: &str) -> Result<()> {
        let _ = collection;
        Err(self.missing_operation("initialize_collection"))
    }

    /// Per-collection teardown hook.
    async fn teardown_collection(&self, collection: &str) -> Result<()> {
        let _ = collection;
        Err(self.missing_operation("teardown_collection"))
    }

    /// Create a collection with the given (already augmented) attributes.
    async fn define(&self, collection: &str, attributes: &Attributes) -> Result<()> {
        let _ = (collection, attributes);
        Err(self.missing_operation("define"))
    }

    /// Return a collection's attributes, or `None` when it does not exist.
    async fn describe(&self, collection: &str) -> Result<Option<Attributes>> {
        let _ = collection;
        Err(self.missing_operation("describe"))
    }

    /// Remove a collection and its records.
    async fn drop_collection(&self, collection: &str) -> Result<()> {
        let _ = collection;
        Err(self.missing_operation("drop_collection"))
    }

    /// Evolve a collection's attributes natively.
    async fn alter(&self, collection: &str, attributes: &Attributes) -> Result<()> {
        let _ = (collection, attributes);
        Err(self.missing_operation("alter"))
    }

    /// Add (or redefine) a single attribute.
    async fn add_attribute(
        &self,
        collection: &str,
        name: &str,
        definition: &AttributeDef,
    ) -> Result<()> {
        let _ = (collection, name, definition);
        Err(self.missing_operation("add_attribute"))
    }

    /// Remove a single attribute and its values.
    async fn remove_attribute(&self, collection: &str, name: &str) -> Result<()> {
        let _ = (collection, name);
        Err(self.missing_operation("remove_attribute"))
    }

    /// Insert a record, assigning the primary key. Returns the stored record.
    async fn create(&self, collection: &str, values: Record) -> Result<Record> {
        let _ = (collection, values);
        Err(self.missing_operation("create"))
    }

    /// Return all records matching the criteria.
    async fn find(&self, collection: &str, criteria: &Criteria) -> Result<Vec<Record>> {
        let _ = (collection, criteria);
        Err(self.missing_operation("find"))
    }

    /// Count records matching the criteria.
    async fn count(&self, collection: &str, criteria: &Criteria) -> Result<u64> {
        let _ = (collection, criteria);
        Err(self.missing_operation("count"))
    }

    /// Merge `values` into every matching record. Returns the updated records.
    async fn update(
        &self,
        collection: &str,
        criteria: &Criteria,
        values: Record,
    ) -> Result<Vec<Record>> {
        let _ = (collection, criteria, values);
        Err(self.missing_operation("update"))
    }

    /// Delete every matching record.
    async fn destroy(&self, collection: &str, criteria: &Criteria) -> Result<()> {
        let _ = (collection, criteria);
        Err(self.missing_operation("destroy"))
    }

    /// Atomically find a matching record or insert `values`.
    async fn find_or_create(
        &self,
        collection: &str,
        criteria: &Criteria,
        values: Record,
    ) -> Result<Record> {
        let _ = (collection, criteria, values);
        Err(self.missing_operation("find_or_create"))
    }

    /// Insert a batch of records.
    async fn create_each(&self, collection: &str, values: Vec<Record>) -> Result<Vec<Record>> {
        let _ = (collection, values);
        Err(self.missing_operation("create_each"))
    }

    /// Find-or-create each element of a batch, matching on `attrs_to_check`.
    async fn find_or_create_each(
        &self,
        collection: &str,
        attrs_to_check: &[String],
        values: Vec<Record>,
    ) -> Result<Vec<Record>> {
        let _ = (collection, attrs_to_check, values);
        Err(self.missing_operation("find_or_create_each"))
    }

    /// Association stub. Adapters with native join support may override.
    async fn join(&self, collection: &str, criteria: &Criteria) -> Result<Vec<Record>> {
        let _ = (collection, criteria);
        Err(self.missing_operation("join"))
    }

    /// The error every default operation body fails with.
    fn missing_operation(&self, operation: &'static str) -> StoreError {
        StoreError::MissingOperation {
            adapter: self.identity().to_string(),
            operation,
        }
    }
}
