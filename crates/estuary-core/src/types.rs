//! Record and value types shared across the workspace.
//!
//! A record is an opaque attribute-name → value mapping owned by a single
//! collection. Estuary does not impose a typed row model; adapters exchange
//! `serde_json` values and the schema layer describes them.

use serde_json::{Map, Value};

/// A single record: attribute name → value.
pub type Record = Map<String, Value>;

/// Compare two JSON values for ordering (used by adapter-side sorting).
///
/// Numbers compare numerically; everything else falls back to string
/// comparison. Mixed or non-comparable values compare equal so that sorting
/// stays stable.
pub fn value_cmp(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    match (a.as_f64(), b.as_f64()) {
        (Some(a_f), Some(b_f)) => a_f.partial_cmp(&b_f).unwrap_or(Ordering::Equal),
        _ => match (a.as_str(), b.as_str()) {
            (Some(a_s), Some(b_s)) => a_s.cmp(b_s),
            _ => Ordering::Equal,
        },
    }
}
