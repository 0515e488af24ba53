//! Attribute model, declaration augmenting, and schema diffing.
//!
//! Collections are declared with a map of attribute definitions, possibly in
//! shorthand form. [`augment`] expands shorthands and injects the implicit
//! columns (primary key, timestamps) so that every adapter sees a uniform
//! attribute set. [`SchemaDiff`] computes what `alter` must add and remove
//! to move one attribute set to another.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;

/// Semantic type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    Datetime,
    Json,
}

/// A fully-specified attribute definition.
///
/// Two definitions are equal iff every field is equal; any difference drives
/// the replace-in-place path of `alter`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    /// Semantic type.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,

    /// This attribute is the collection's primary key.
    #[serde(default)]
    pub primary_key: bool,

    /// The adapter assigns values automatically on insert.
    #[serde(default)]
    pub auto_increment: bool,

    /// Values must be unique within the collection.
    #[serde(default)]
    pub unique: bool,

    /// A value must be present on insert.
    #[serde(default)]
    pub required: bool,
}

impl AttributeDef {
    /// A plain attribute of the given type with no constraints.
    pub fn of(attr_type: AttributeType) -> Self {
        Self {
            attr_type,
            primary_key: false,
            auto_increment: false,
            unique: false,
            required: false,
        }
    }

    /// Mark as primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark as auto-incrementing.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Mark as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Mark as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A declared attribute: the shorthand (bare type name) or the full form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeSpec {
    /// `"string"`, `"integer"`, ... — expands to an unconstrained definition.
    Shorthand(AttributeType),
    /// The full definition.
    Full(AttributeDef),
}

impl AttributeSpec {
    /// Expand to a full definition.
    pub fn to_def(&self) -> AttributeDef {
        match self {
            AttributeSpec::Shorthand(attr_type) => AttributeDef::of(*attr_type),
            AttributeSpec::Full(def) => def.clone(),
        }
    }
}

impl From<AttributeType> for AttributeSpec {
    fn from(attr_type: AttributeType) -> Self {
        AttributeSpec::Shorthand(attr_type)
    }
}

impl From<AttributeDef> for AttributeSpec {
    fn from(def: AttributeDef) -> Self {
        AttributeSpec::Full(def)
    }
}

/// Attribute definitions as declared by the caller.
pub type DeclaredAttributes = BTreeMap<String, AttributeSpec>;

/// Fully-expanded attribute definitions as stored by adapters.
pub type Attributes = BTreeMap<String, AttributeDef>;

/// Attribute name used for the implicit primary key.
pub const PRIMARY_KEY: &str = "id";

/// Attribute name stamped on insert.
pub const CREATED_AT: &str = "created_at";

/// Attribute name stamped on insert and update.
pub const UPDATED_AT: &str = "updated_at";

/// Expand a declaration into the uniform attribute set every adapter sees.
///
/// Injects an auto-increment `id` primary key when the declaration carries
/// no primary key, and the timestamp attributes enabled in `config`.
pub fn augment(declared: &DeclaredAttributes, config: &StoreConfig) -> Attributes {
    let mut attributes: Attributes = declared
        .iter()
        .map(|(name, spec)| (name.clone(), spec.to_def()))
        .collect();

    let has_primary = attributes.values().any(|def| def.primary_key);
    if !has_primary {
        attributes.insert(
            PRIMARY_KEY.to_string(),
            AttributeDef::of(AttributeType::Integer)
                .primary_key()
                .auto_increment()
                .unique(),
        );
    }

    if config.created_at {
        attributes
            .entry(CREATED_AT.to_string())
            .or_insert_with(|| AttributeDef::of(AttributeType::Datetime));
    }
    if config.updated_at {
        attributes
            .entry(UPDATED_AT.to_string())
            .or_insert_with(|| AttributeDef::of(AttributeType::Datetime));
    }

    attributes
}

/// What `alter` must do to move `current` to `target`.
///
/// An attribute whose definition changed appears in both sets: it is dropped
/// and re-added. Adds are applied before removes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SchemaDiff {
    /// Attributes to add, keyed by name, with the target definition.
    pub added: Attributes,
    /// Attributes to remove, keyed by name, with the current definition.
    pub removed: Attributes,
}

impl SchemaDiff {
    /// Compute the diff between two attribute sets.
    pub fn between(current: &Attributes, target: &Attributes) -> Self {
        let mut diff = SchemaDiff::default();

        for (name, def) in target {
            match current.get(name) {
                None => {
                    diff.added.insert(name.clone(), def.clone());
                }
                Some(existing) if existing != def => {
                    diff.added.insert(name.clone(), def.clone());
                    diff.removed.insert(name.clone(), existing.clone());
                }
                Some(_) => {}
            }
        }
        for (name, def) in current {
            if !target.contains_key(name) {
                diff.removed.insert(name.clone(), def.clone());
            }
        }

        diff
    }

    /// True when there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}
