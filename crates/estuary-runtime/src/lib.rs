//! The Estuary runtime: the store facade, the lock manager, and schema
//! synchronization.
//!
//! A [`Store`] turns any [`Adapter`](estuary_core::Adapter) — however
//! partial — into the full collection API, and the [`LockManager`] gives
//! every process sharing that adapter's backing store named, FIFO mutual
//! exclusion built from nothing but the adapter's own CRUD.

pub mod lock;
pub mod store;
pub mod sync;

pub use lock::{LockEntry, LockManager};
pub use store::Store;
pub use sync::SyncStrategy;
