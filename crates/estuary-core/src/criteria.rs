//! Criteria normalization.
//!
//! Callers may describe a query as a record id, a numeric string, a bare
//! where-mapping, or a full criteria descriptor. [`Criteria::normalize`]
//! canonicalizes all of these into one [`Criteria`] shape, or rejects the
//! input with [`StoreError::InvalidCriteria`]. Adapters only ever see the
//! canonical shape.

use serde_json::{Map, Number, Value};

use crate::error::StoreError;
use crate::Result;

/// Keys that mark a mapping as an already-shaped criteria descriptor rather
/// than a bare where clause.
const OPERATIONAL_KEYS: [&str; 5] = ["where", "limit", "skip", "offset", "order"];

/// Sort direction for a single attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// An ordered list of (attribute, direction) pairs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sort(pub Vec<(String, SortDirection)>);

impl Sort {
    /// Sort by a single attribute.
    pub fn by(attr: impl Into<String>, direction: SortDirection) -> Self {
        Sort(vec![(attr.into(), direction)])
    }

    /// Parse a sort descriptor from its JSON form.
    ///
    /// Accepts a mapping `{attr: 1 | -1}` or a string `"<attr> [asc|desc]"`
    /// (direction case-insensitive, default ascending).
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => {
                let mut pairs = Vec::with_capacity(map.len());
                for (attr, dir) in map {
                    let direction = match dir.as_i64() {
                        Some(1) => SortDirection::Asc,
                        Some(-1) => SortDirection::Desc,
                        _ => {
                            return Err(StoreError::invalid_criteria(format!(
                                "sort direction for '{attr}' must be 1 or -1"
                            )))
                        }
                    };
                    pairs.push((attr.clone(), direction));
                }
                Ok(Sort(pairs))
            }
            Value::String(text) => {
                let mut words = text.split_whitespace();
                let attr = words.next().ok_or_else(|| {
                    StoreError::invalid_criteria("sort string is empty")
                })?;
                let direction = match words.next() {
                    None => SortDirection::Asc,
                    Some(word) if word.eq_ignore_ascii_case("asc") => SortDirection::Asc,
                    Some(word) if word.eq_ignore_ascii_case("desc") => SortDirection::Desc,
                    Some(word) => {
                        return Err(StoreError::invalid_criteria(format!(
                            "unknown sort direction '{word}'"
                        )))
                    }
                };
                if words.next().is_some() {
                    return Err(StoreError::invalid_criteria(format!(
                        "sort string '{text}' has trailing words"
                    )));
                }
                Ok(Sort::by(attr, direction))
            }
            other => Err(StoreError::invalid_criteria(format!(
                "sort must be a mapping or a string, got {other}"
            ))),
        }
    }
}

/// The canonical query descriptor.
///
/// All fields are optional. A `where_clause` of `None` matches everything.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Criteria {
    /// Attribute name → scalar (equality) or structured predicate.
    pub where_clause: Option<Map<String, Value>>,
    /// Maximum number of records to return.
    pub limit: Option<u64>,
    /// Number of records to skip before returning.
    pub skip: Option<u64>,
    /// Alias for `skip` kept distinct for adapters that differentiate.
    pub offset: Option<u64>,
    /// Result ordering.
    pub sort: Option<Sort>,
}

/// The shapes a caller may pass where criteria are expected.
#[derive(Debug, Clone)]
pub enum CriteriaInput {
    /// No criteria: match everything.
    None,
    /// A record id.
    Number(f64),
    /// A numeric string (anything else is rejected).
    Text(String),
    /// An arbitrary JSON value, classified during normalization.
    Json(Value),
    /// An already-normalized descriptor.
    Criteria(Criteria),
}

impl From<()> for CriteriaInput {
    fn from(_: ()) -> Self {
        CriteriaInput::None
    }
}

impl From<u64> for CriteriaInput {
    fn from(id: u64) -> Self {
        CriteriaInput::Number(id as f64)
    }
}

impl From<i64> for CriteriaInput {
    fn from(id: i64) -> Self {
        CriteriaInput::Number(id as f64)
    }
}

impl From<f64> for CriteriaInput {
    fn from(id: f64) -> Self {
        CriteriaInput::Number(id)
    }
}

impl From<&str> for CriteriaInput {
    fn from(text: &str) -> Self {
        CriteriaInput::Text(text.to_string())
    }
}

impl From<String> for CriteriaInput {
    fn from(text: String) -> Self {
        CriteriaInput::Text(text)
    }
}

impl From<Value> for CriteriaInput {
    fn from(value: Value) -> Self {
        CriteriaInput::Json(value)
    }
}

impl From<Criteria> for CriteriaInput {
    fn from(criteria: Criteria) -> Self {
        CriteriaInput::Criteria(criteria)
    }
}

impl Criteria {
    /// Criteria that select a single record by id.
    pub fn by_id(id: u64) -> Self {
        let mut where_clause = Map::new();
        where_clause.insert("id".to_string(), Value::from(id));
        Criteria {
            where_clause: Some(where_clause),
            ..Default::default()
        }
    }

    /// Criteria with only a where clause.
    pub fn with_where(where_clause: Map<String, Value>) -> Self {
        Criteria {
            where_clause: Some(where_clause),
            ..Default::default()
        }
    }

    /// Canonicalize any accepted input shape.
    ///
    /// Normalization is idempotent: feeding the output back in yields an
    /// equal value.
    pub fn normalize(input: impl Into<CriteriaInput>) -> Result<Self> {
        match input.into() {
            CriteriaInput::None => Ok(Criteria::default()),
            CriteriaInput::Number(n) => from_number(n),
            CriteriaInput::Text(text) => from_text(&text),
            CriteriaInput::Json(value) => from_json(value),
            CriteriaInput::Criteria(mut criteria) => {
                if let Some(where_clause) = criteria.where_clause.as_mut() {
                    rewrite_numeric_strings(where_clause);
                }
                Ok(criteria)
            }
        }
    }
}

fn from_number(n: f64) -> Result<Criteria> {
    if !n.is_finite() || n <= 0.0 {
        return Err(StoreError::invalid_criteria(format!(
            "expected a positive record id, got {n}"
        )));
    }
    let mut where_clause = Map::new();
    where_clause.insert("id".to_string(), number_value(n));
    Ok(Criteria {
        where_clause: Some(where_clause),
        ..Default::default()
    })
}

fn from_text(text: &str) -> Result<Criteria> {
    match text.trim().parse::<f64>() {
        Ok(n) => from_number(n),
        Err(_) => Err(StoreError::invalid_criteria(format!(
            "'{text}' is neither a record id nor a criteria mapping"
        ))),
    }
}

fn from_json(value: Value) -> Result<Criteria> {
    match value {
        Value::Null => Ok(Criteria::default()),
        Value::Number(n) => {
            let n = n.as_f64().ok_or_else(|| {
                StoreError::invalid_criteria("record id is not representable")
            })?;
            from_number(n)
        }
        Value::String(text) => from_text(&text),
        Value::Object(map) => from_object(map),
        other => Err(StoreError::invalid_criteria(format!(
            "expected criteria, got {other}"
        ))),
    }
}

fn from_object(map: Map<String, Value>) -> Result<Criteria> {
    let shaped = OPERATIONAL_KEYS.iter().any(|key| map.contains_key(*key));

    // A mapping without any operational key is a bare where clause.
    if !shaped {
        let mut where_clause = map;
        rewrite_numeric_strings(&mut where_clause);
        return Ok(Criteria {
            where_clause: Some(where_clause),
            ..Default::default()
        });
    }

    let mut criteria = Criteria::default();
    for (key, value) in map {
        match key.as_str() {
            "where" => {
                criteria.where_clause = match value {
                    Value::Null => None,
                    Value::Object(clause) => Some(clause),
                    other => {
                        return Err(StoreError::invalid_criteria(format!(
                            "where must be a mapping or null, got {other}"
                        )))
                    }
                };
            }
            "limit" => criteria.limit = Some(parse_bound("limit", &value)?),
            "skip" => criteria.skip = Some(parse_bound("skip", &value)?),
            "offset" => criteria.offset = Some(parse_bound("offset", &value)?),
            // `order` is an input alias for `sort`.
            "order" | "sort" => criteria.sort = Some(Sort::parse(&value)?),
            _ => {}
        }
    }
    if let Some(where_clause) = criteria.where_clause.as_mut() {
        rewrite_numeric_strings(where_clause);
    }
    Ok(criteria)
}

fn parse_bound(key: &str, value: &Value) -> Result<u64> {
    match value {
        Value::Number(n) => n.as_u64().ok_or_else(|| {
            StoreError::invalid_criteria(format!("{key} must be a non-negative integer"))
        }),
        Value::String(text) => text.trim().parse::<u64>().map_err(|_| {
            StoreError::invalid_criteria(format!("{key} '{text}' is not an integer"))
        }),
        other => Err(StoreError::invalid_criteria(format!(
            "{key} must be a number, got {other}"
        ))),
    }
}

/// Rewrite top-level where values that parse as a nonzero finite number, so
/// that `"5"` and `5` describe the same query.
fn rewrite_numeric_strings(where_clause: &mut Map<String, Value>) {
    for value in where_clause.values_mut() {
        if let Value::String(text) = value {
            if let Ok(n) = text.trim().parse::<f64>() {
                if n.is_finite() && n != 0.0 {
                    *value = number_value(n);
                }
            }
        }
    }
}

/// Represent a float as an integer JSON number when lossless.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}
