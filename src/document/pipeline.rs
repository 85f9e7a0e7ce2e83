//! Filters and aggregation stages over JSON documents.
//!
//! Paths are dotted field names (`albums.release_date`). When a path crosses an
//! array, matching looks at every element, so a filter on `genres.genre_name`
//! matches a band if any of its genres has that name. Values of different JSON
//! types never satisfy a range, and sorting orders them as
//! null < numbers < strings < objects < arrays < booleans. A sum over
//! integers that leaves the `i64` range fails the whole pipeline.

use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("integer overflow in sum {field}")]
    SumOverflow { field: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    /// Half-open range `[gte, lt)`; a missing bound is unbounded.
    Range {
        path: String,
        gte: Option<Value>,
        lt: Option<Value>,
    },
    /// The path is present, even when it holds `null`.
    Exists(String),
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq<V: Into<Value>>(path: &str, value: V) -> Self {
        Filter::Eq(path.to_string(), value.into())
    }

    pub fn range<V: Into<Value>>(path: &str, gte: V, lt: V) -> Self {
        Filter::Range {
            path: path.to_string(),
            gte: Some(gte.into()),
            lt: Some(lt.into()),
        }
    }

    pub fn exists(path: &str) -> Self {
        Filter::Exists(path.to_string())
    }

    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Filter::Eq(path, expected) => values_at(document, path)
                .into_iter()
                .any(|v| compare_values(v, expected) == Ordering::Equal),
            Filter::Range { path, gte, lt } => values_at(document, path)
                .into_iter()
                .any(|v| in_range(v, gte.as_ref(), lt.as_ref())),
            Filter::Exists(path) => !raw_values_at(document, path).is_empty(),
            Filter::And(filters) => filters.iter().all(|f| f.matches(document)),
        }
    }
}

pub fn in_range(value: &Value, gte: Option<&Value>, lt: Option<&Value>) -> bool {
    let above = gte.map_or(true, |bound| {
        same_type(value, bound) && compare_values(value, bound) != Ordering::Less
    });
    let below = lt.map_or(true, |bound| {
        same_type(value, bound) && compare_values(value, bound) == Ordering::Less
    });
    above && below
}

#[derive(Clone, Debug, PartialEq)]
pub enum Accumulator {
    /// Sum of the numeric values at a path; anything else counts as zero.
    Sum(String),
    /// Value at a path in the first document of the group.
    First(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stage {
    Match(Filter),
    /// One output document per element of the array at the path. Documents
    /// where the path is missing, null or an empty array are dropped.
    Unwind(String),
    /// Groups by the named key paths into `{"_id": {name: value, ..}, field: acc, ..}`.
    /// Groups come out in the order their first document was seen.
    Group {
        key: Vec<(String, String)>,
        fields: Vec<(String, Accumulator)>,
    },
    Sort(Vec<(String, SortOrder)>),
    Limit(usize),
    /// Keep `_id` and the listed paths only.
    Project(Vec<String>),
}

/// Values at `path`, descending into arrays at every step. Arrays found at
/// the end of the path are flattened into their elements.
pub fn values_at<'a>(document: &'a Value, path: &str) -> Vec<&'a Value> {
    raw_values_at(document, path)
        .into_iter()
        .flat_map(|value| match value {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect()
}

fn raw_values_at<'a>(document: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![document];
    for field in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(map) => {
                    if let Some(child) = map.get(field) {
                        next.push(child);
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if let Some(child) = item.as_object().and_then(|m| m.get(field)) {
                            next.push(child);
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    current
}

/// Value at `path` through nested objects only.
pub fn value_at<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |value, field| value.as_object()?.get(field))
}

/// Set `path` to `value`, creating intermediate objects. Returns false when the
/// path runs through something that is not an object.
pub fn set_path(document: &mut Value, path: &str, value: Value) -> bool {
    let mut fields = path.split('.').peekable();
    let mut current = document;
    while let Some(field) = fields.next() {
        let map = match current.as_object_mut() {
            Some(map) => map,
            None => return false,
        };
        if fields.peek().is_none() {
            map.insert(field.to_string(), value);
            return true;
        }
        current = map
            .entry(field.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    false
}

/// Remove `path`, returning the removed value.
pub fn remove_path(document: &mut Value, path: &str) -> Option<Value> {
    let (parent, field) = match path.rsplit_once('.') {
        Some((parent, field)) => (value_at_mut(document, parent)?, field),
        None => (document, path),
    };
    parent.as_object_mut()?.remove(field)
}

pub fn value_at_mut<'a>(document: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.')
        .try_fold(document, |value, field| value.as_object_mut()?.get_mut(field))
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

fn same_type(a: &Value, b: &Value) -> bool {
    type_rank(a) == type_rank(b)
}

pub fn compare_numbers(a: &Number, b: &Number) -> Ordering {
    match (a.as_i64(), b.as_i64()) {
        (Some(a), Some(b)) => a.cmp(&b),
        _ => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.total_cmp(&b)
        }
    }
}

/// Total order over JSON values.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Number(a), Value::Number(b)) => compare_numbers(a, b),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| compare_values(x, y))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        (Value::Object(a), Value::Object(b)) => a
            .iter()
            .zip(b.iter())
            .map(|((ka, va), (kb, vb))| ka.cmp(kb).then_with(|| compare_values(va, vb)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[derive(Default)]
struct SumState {
    int: i64,
    float: f64,
    is_float: bool,
    overflowed: bool,
}

impl SumState {
    fn add(&mut self, value: Option<&Value>) {
        let Some(Value::Number(number)) = value else {
            return;
        };
        match number.as_i64() {
            Some(i) if !self.is_float => match self.int.checked_add(i) {
                Some(sum) => self.int = sum,
                None => self.overflowed = true,
            },
            _ => {
                if !self.is_float {
                    self.is_float = true;
                    self.float = self.int as f64;
                }
                self.float += number.as_f64().unwrap_or(0.0);
            }
        }
    }

    fn into_value(self, field: &str) -> Result<Value, PipelineError> {
        if self.overflowed {
            Err(PipelineError::SumOverflow {
                field: field.to_string(),
            })
        } else if self.is_float {
            Ok(Value::from(self.float))
        } else {
            Ok(Value::from(self.int))
        }
    }
}

enum AccState {
    Sum(SumState),
    First(Value),
}

struct GroupState {
    id: Value,
    accumulators: Vec<AccState>,
}

fn unwind(documents: Vec<Value>, path: &str) -> Vec<Value> {
    let mut out = Vec::with_capacity(documents.len());
    for document in documents {
        let items = match value_at(&document, path) {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => continue,
            Some(_) => {
                out.push(document);
                continue;
            }
        };
        for item in items {
            let mut copy = document.clone();
            set_path(&mut copy, path, item);
            out.push(copy);
        }
    }
    out
}

fn group(
    documents: Vec<Value>,
    key: &[(String, String)],
    fields: &[(String, Accumulator)],
) -> Result<Vec<Value>, PipelineError> {
    let mut groups: Vec<GroupState> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for document in &documents {
        let mut id = Map::new();
        for (name, path) in key {
            id.insert(
                name.clone(),
                value_at(document, path).cloned().unwrap_or(Value::Null),
            );
        }
        let id = Value::Object(id);
        let group_key = id.to_string();

        let position = match positions.get(&group_key) {
            Some(position) => *position,
            None => {
                let accumulators = fields
                    .iter()
                    .map(|(_, acc)| match acc {
                        Accumulator::Sum(_) => AccState::Sum(SumState::default()),
                        Accumulator::First(path) => {
                            AccState::First(value_at(document, path).cloned().unwrap_or(Value::Null))
                        }
                    })
                    .collect();
                groups.push(GroupState { id, accumulators });
                positions.insert(group_key, groups.len() - 1);
                groups.len() - 1
            }
        };

        for ((_, acc), state) in fields.iter().zip(groups[position].accumulators.iter_mut()) {
            if let (Accumulator::Sum(path), AccState::Sum(sum)) = (acc, state) {
                sum.add(value_at(document, path));
            }
        }
    }

    groups
        .into_iter()
        .map(|group| {
            let mut out = Map::new();
            out.insert("_id".to_string(), group.id);
            for ((name, _), state) in fields.iter().zip(group.accumulators) {
                let value = match state {
                    AccState::Sum(sum) => sum.into_value(name)?,
                    AccState::First(value) => value,
                };
                out.insert(name.clone(), value);
            }
            Ok(Value::Object(out))
        })
        .collect()
}

fn sort(documents: &mut [Value], keys: &[(String, SortOrder)]) {
    documents.sort_by(|a, b| {
        keys.iter()
            .map(|(path, order)| {
                let left = value_at(a, path).unwrap_or(&Value::Null);
                let right = value_at(b, path).unwrap_or(&Value::Null);
                let ordering = compare_values(left, right);
                match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

fn project(documents: Vec<Value>, paths: &[String]) -> Vec<Value> {
    documents
        .into_iter()
        .map(|document| {
            let mut out = Value::Object(Map::new());
            if let Some(id) = value_at(&document, "_id") {
                set_path(&mut out, "_id", id.clone());
            }
            for path in paths {
                if let Some(value) = value_at(&document, path) {
                    set_path(&mut out, path, value.clone());
                }
            }
            out
        })
        .collect()
}

/// Run `stages` in order over `documents`.
pub fn run(mut documents: Vec<Value>, stages: &[Stage]) -> Result<Vec<Value>, PipelineError> {
    for stage in stages {
        documents = match stage {
            Stage::Match(filter) => documents
                .into_iter()
                .filter(|d| filter.matches(d))
                .collect(),
            Stage::Unwind(path) => unwind(documents, path),
            Stage::Group { key, fields } => group(documents, key, fields)?,
            Stage::Sort(keys) => {
                sort(&mut documents, keys);
                documents
            }
            Stage::Limit(n) => {
                documents.truncate(*n);
                documents
            }
            Stage::Project(paths) => project(documents, paths),
        };
    }
    Ok(documents)
}
