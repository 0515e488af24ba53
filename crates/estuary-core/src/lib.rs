//! Estuary core types, traits, configuration, and errors.
//!
//! This crate provides the foundational building blocks for the Estuary
//! storage-abstraction layer: the [`Adapter`] trait and its
//! [`Capabilities`], the criteria normalizer, the attribute model with
//! declaration augmenting and schema diffing, store configuration, and the
//! unified error type.

pub mod adapter;
pub mod config;
pub mod criteria;
pub mod error;
pub mod schema;
pub mod types;

pub use adapter::{Adapter, Capabilities};
pub use config::StoreConfig;
pub use criteria::{Criteria, CriteriaInput, Sort, SortDirection};
pub use error::StoreError;
pub use schema::{
    augment, AttributeDef, AttributeSpec, AttributeType, Attributes, DeclaredAttributes,
    SchemaDiff, CREATED_AT, PRIMARY_KEY, UPDATED_AT,
};
pub use types::Record;

/// Convenience Result type using [`StoreError`].
pub type Result<T> = std::result::Result<T, StoreError>;
