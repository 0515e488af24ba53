//! Unified error types for Estuary.
//!
//! All errors in Estuary are represented by [`StoreError`], using `thiserror`
//! for ergonomic error definitions. Library code never uses `unwrap()` —
//! all fallible operations return `Result<T, StoreError>`.

use thiserror::Error;

/// The unified error type for all Estuary operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Criteria passed to a query operation could not be normalized.
    #[error("Invalid criteria: {message}")]
    InvalidCriteria {
        /// What was wrong with the input.
        message: String,
    },

    /// The adapter does not implement an operation the caller requires.
    #[error("Adapter '{adapter}' does not implement {operation}()")]
    MissingOperation {
        /// The adapter's identity string.
        adapter: String,
        /// The missing operation name.
        operation: &'static str,
    },

    /// A collection with this name is already defined.
    #[error("Collection already exists: {name}")]
    CollectionExists {
        /// The conflicting collection name.
        name: String,
    },

    /// The named collection does not exist.
    #[error("Collection not found: {name}")]
    CollectionNotFound {
        /// The name that was not found.
        name: String,
    },

    /// A single-record lookup matched more than one record.
    #[error("More than one record returned from '{collection}': {matched} matched")]
    AmbiguousMatch {
        /// The collection queried.
        collection: String,
        /// How many records matched.
        matched: usize,
    },

    /// An adapter operation failed. Passed through untranslated.
    #[error("Adapter error: {message}")]
    Adapter {
        /// Human-readable description of the failure.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Lock acquisition or release failed.
    #[error("Lock error on '{name}': {message}")]
    Lock {
        /// The transaction name involved.
        name: String,
        /// Description of the failure.
        message: String,
    },

    /// A record or schema could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An internal error (bug).
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StoreError {
    /// Create an adapter error from a message and source error.
    pub fn adapter(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Adapter {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an adapter error from a message only.
    pub fn adapter_msg(message: impl Into<String>) -> Self {
        Self::Adapter {
            message: message.into(),
            source: None,
        }
    }

    /// Create an invalid-criteria error.
    pub fn invalid_criteria(message: impl Into<String>) -> Self {
        Self::InvalidCriteria {
            message: message.into(),
        }
    }
}
