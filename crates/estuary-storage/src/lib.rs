//! Adapter implementations for Estuary.
//!
//! This crate provides concrete implementations of the
//! [`Adapter`](estuary_core::Adapter) trait:
//!
//! - [`MemoryAdapter`] — in-process storage for tests and ephemeral data
//! - [`LocalAdapter`] — one JSON file per record on the local filesystem,
//!   safe for multiple processes sharing a directory

pub mod filter;
pub mod local;
pub mod memory;

pub use local::LocalAdapter;
pub use memory::MemoryAdapter;
