//! In-memory criteria application shared by the shipped adapters.
//!
//! Both [`MemoryAdapter`](crate::MemoryAdapter) and
//! [`LocalAdapter`](crate::LocalAdapter) hold plain record sets and answer
//! queries by filtering them here: where-clause matching (equality and
//! structured predicates), then sort, then skip/offset, then limit.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use estuary_core::criteria::{Criteria, SortDirection};
use estuary_core::types::{value_cmp, Record};
use estuary_core::{Result, StoreError};

/// Does `record` match the criteria's where clause?
pub fn matches(record: &Record, criteria: &Criteria) -> Result<bool> {
    let Some(where_clause) = criteria.where_clause.as_ref() else {
        return Ok(true);
    };
    for (attr, condition) in where_clause {
        let value = record.get(attr).unwrap_or(&Value::Null);
        let hit = match condition {
            Value::Object(predicate) => matches_predicate(value, predicate)?,
            scalar => values_equal(value, scalar),
        };
        if !hit {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Apply the full criteria pipeline to a record set:
/// where clause, sort, skip/offset, limit.
pub fn apply(mut records: Vec<Record>, criteria: &Criteria) -> Result<Vec<Record>> {
    let mut selected = Vec::with_capacity(records.len());
    for record in records.drain(..) {
        if matches(&record, criteria)? {
            selected.push(record);
        }
    }

    if let Some(sort) = criteria.sort.as_ref() {
        selected.sort_by(|a, b| {
            for (attr, direction) in &sort.0 {
                let left = a.get(attr).unwrap_or(&Value::Null);
                let right = b.get(attr).unwrap_or(&Value::Null);
                let ordering = match direction {
                    SortDirection::Asc => value_cmp(left, right),
                    SortDirection::Desc => value_cmp(right, left),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    let skip = criteria.skip.or(criteria.offset).unwrap_or(0) as usize;
    let mut selected: Vec<Record> = selected.into_iter().skip(skip).collect();

    if let Some(limit) = criteria.limit {
        selected.truncate(limit as usize);
    }

    Ok(selected)
}

/// Equality with numeric coercion, so a stored `"5"` matches a queried `5`.
fn values_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (as_number(a), as_number(b)) {
        (Some(a_f), Some(b_f)) => a_f == b_f,
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Evaluate a structured predicate object; every operator must hold.
fn matches_predicate(value: &Value, predicate: &Map<String, Value>) -> Result<bool> {
    for (operator, operand) in predicate {
        let hit = match operator.as_str() {
            "lessThan" | "<" => value_cmp(value, operand) == Ordering::Less,
            "lessThanOrEqual" | "<=" => value_cmp(value, operand) != Ordering::Greater,
            "greaterThan" | ">" => value_cmp(value, operand) == Ordering::Greater,
            "greaterThanOrEqual" | ">=" => value_cmp(value, operand) != Ordering::Less,
            "not" | "!" => !values_equal(value, operand),
            "contains" => match (value.as_str(), operand.as_str()) {
                (Some(haystack), Some(needle)) => haystack.contains(needle),
                _ => false,
            },
            other => {
                return Err(StoreError::adapter_msg(format!(
                    "unsupported predicate operator '{other}'"
                )))
            }
        };
        if !hit {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn records() -> Vec<Record> {
        vec![
            record(json!({"id": 1, "name": "ada", "age": 30})),
            record(json!({"id": 2, "name": "bob", "age": 25})),
            record(json!({"id": 3, "name": "cyd", "age": 35})),
        ]
    }

    #[test]
    fn test_equality_match() {
        let criteria = Criteria::normalize(json!({"name": "bob"})).unwrap();
        let hits = apply(records(), &criteria).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["id"], json!(2));
    }

    #[test]
    fn test_numeric_coercion() {
        let stored = vec![record(json!({"id": 1, "age": "30"}))];
        let criteria = Criteria::normalize(json!({"age": 30})).unwrap();
        assert_eq!(apply(stored, &criteria).unwrap().len(), 1);
    }

    #[test]
    fn test_comparison_predicates() {
        let criteria = Criteria::normalize(json!({"age": {">": 26}})).unwrap();
        let hits = apply(records(), &criteria).unwrap();
        assert_eq!(hits.len(), 2);

        let criteria =
            Criteria::normalize(json!({"age": {"greaterThanOrEqual": 25, "lessThan": 35}}))
                .unwrap();
        let hits = apply(records(), &criteria).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_not_and_contains() {
        let criteria = Criteria::normalize(json!({"name": {"!": "bob"}})).unwrap();
        assert_eq!(apply(records(), &criteria).unwrap().len(), 2);

        let criteria = Criteria::normalize(json!({"name": {"contains": "yd"}})).unwrap();
        let hits = apply(records(), &criteria).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["name"], json!("cyd"));
    }

    #[test]
    fn test_unknown_predicate_errors() {
        let criteria = Criteria::normalize(json!({"age": {"near": 30}})).unwrap();
        assert!(apply(records(), &criteria).is_err());
    }

    #[test]
    fn test_sort_skip_limit() {
        let criteria = Criteria::normalize(json!({
            "where": null,
            "sort": {"age": -1},
            "skip": 1,
            "limit": 1,
        }))
        .unwrap();
        let hits = apply(records(), &criteria).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["name"], json!("ada"));
    }

    #[test]
    fn test_missing_attribute_matches_nothing() {
        let criteria = Criteria::normalize(json!({"nickname": "ace"})).unwrap();
        assert!(apply(records(), &criteria).unwrap().is_empty());
    }
}
