//! Startup schema synchronization strategies.
//!
//! At startup a host picks, per collection, how the declared schema meets
//! whatever already exists in the backing store: recreate from scratch,
//! evolve in place, or trust what is there.

use tracing::debug;

use estuary_core::schema::DeclaredAttributes;
use estuary_core::Result;

use crate::store::Store;

/// How [`Store::sync`] reconciles a declared schema with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Drop the collection unconditionally, then define it fresh.
    /// Destroys data; development only.
    Drop,
    /// Define the collection when absent, otherwise alter it in place.
    Alter,
    /// Touch nothing; trust the existing schema.
    Safe,
}

impl Store {
    /// Reconcile one collection with its declaration using the given
    /// strategy.
    pub async fn sync(
        &self,
        name: &str,
        declared: &DeclaredAttributes,
        strategy: SyncStrategy,
    ) -> Result<()> {
        match strategy {
            SyncStrategy::Drop => {
                self.drop_collection(name).await?;
                self.define(name, declared).await?;
                debug!(collection = %name, "sync: dropped and redefined");
                Ok(())
            }
            SyncStrategy::Alter => {
                if self.describe(name).await?.is_none() {
                    self.define(name, declared).await?;
                    debug!(collection = %name, "sync: defined new collection");
                } else {
                    self.alter(name, declared).await?;
                    debug!(collection = %name, "sync: altered existing collection");
                }
                Ok(())
            }
            SyncStrategy::Safe => Ok(()),
        }
    }
}
