//! File-backed document collections with lookup indexes.
//!
//! All collections of a store live in one JSON file. Opening a store reads the
//! file and rebuilds every index in memory; [`DocumentStore::flush`] writes the
//! documents and the list of indexed paths back. An index maps each scalar
//! value found at its path (array elements included) to the documents holding
//! it, and serves the leading equality or range filter of a query. The filter
//! is always re-applied to the candidates, so results never depend on whether
//! an index exists.

use super::pipeline::{self, remove_path, set_path, value_at, value_at_mut, Filter, Stage};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub type DocId = u64;

pub const ID_FIELD: &str = "_id";

/// Modification applied to one matched document.
#[derive(Clone, Debug, PartialEq)]
pub enum Update {
    Set(String, Value),
    Unset(String),
    /// Append to the array at the path, creating it when missing.
    Push(String, Value),
    /// Remove the elements of `array` whose `id_field` equals `id`.
    PullById {
        array: String,
        id_field: String,
        id: Value,
    },
}

impl Update {
    fn touched_path(&self) -> &str {
        match self {
            Update::Set(path, _) | Update::Unset(path) | Update::Push(path, _) => path,
            Update::PullById { array, .. } => array,
        }
    }

    /// Apply to `document`, returning whether it changed.
    fn apply(&self, document: &mut Value) -> Result<bool> {
        let path = self.touched_path();
        if path == ID_FIELD || path.starts_with("_id.") {
            bail!("Field {} cannot be updated", ID_FIELD);
        }
        match self {
            Update::Set(path, value) => {
                if value_at(document, path) == Some(value) {
                    return Ok(false);
                }
                if !set_path(document, path, value.clone()) {
                    bail!("Cannot set {}: parent is not an object", path);
                }
                Ok(true)
            }
            Update::Unset(path) => Ok(remove_path(document, path).is_some()),
            Update::Push(path, value) => match value_at_mut(document, path) {
                Some(Value::Array(items)) => {
                    items.push(value.clone());
                    Ok(true)
                }
                Some(Value::Null) | None => {
                    if !set_path(document, path, Value::Array(vec![value.clone()])) {
                        bail!("Cannot push to {}: parent is not an object", path);
                    }
                    Ok(true)
                }
                Some(_) => bail!("Cannot push to {}: not an array", path),
            },
            Update::PullById {
                array,
                id_field,
                id,
            } => match value_at_mut(document, array) {
                Some(Value::Array(items)) => {
                    let before = items.len();
                    items.retain(|item| item.get(id_field.as_str()) != Some(id));
                    Ok(items.len() != before)
                }
                _ => Ok(false),
            },
        }
    }
}

#[derive(Clone, Debug)]
struct NumberKey(f64);

impl PartialEq for NumberKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for NumberKey {}

impl PartialOrd for NumberKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NumberKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Indexed scalar. Variant order follows the sort order of the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum IndexKey {
    Null,
    Number(NumberKey),
    String(String),
    Bool(bool),
}

impl IndexKey {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(IndexKey::Null),
            Value::Bool(b) => Some(IndexKey::Bool(*b)),
            Value::Number(n) => n.as_f64().map(|f| IndexKey::Number(NumberKey(f))),
            Value::String(s) => Some(IndexKey::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    fn same_variant(&self, other: &IndexKey) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

#[derive(Debug, Default)]
struct PathIndex {
    entries: BTreeMap<IndexKey, BTreeSet<DocId>>,
}

impl PathIndex {
    fn keys(path: &str, document: &Value) -> BTreeSet<IndexKey> {
        pipeline::values_at(document, path)
            .into_iter()
            .filter_map(IndexKey::from_value)
            .collect()
    }

    fn insert(&mut self, path: &str, id: DocId, document: &Value) {
        for key in Self::keys(path, document) {
            self.entries.entry(key).or_default().insert(id);
        }
    }

    fn remove(&mut self, path: &str, id: DocId, document: &Value) {
        for key in Self::keys(path, document) {
            if let Some(ids) = self.entries.get_mut(&key) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }

    fn lookup_eq(&self, value: &Value) -> Option<BTreeSet<DocId>> {
        let key = IndexKey::from_value(value)?;
        Some(self.entries.get(&key).cloned().unwrap_or_default())
    }

    /// Candidates for `[gte, lt)`. Bounds are taken inclusively here since
    /// number keys are approximate; the caller re-applies the filter.
    fn lookup_range(&self, gte: &Value, lt: &Value) -> Option<BTreeSet<DocId>> {
        let low = IndexKey::from_value(gte)?;
        let high = IndexKey::from_value(lt)?;
        if !low.same_variant(&high) {
            return None;
        }
        if low > high {
            return Some(BTreeSet::new());
        }
        Some(
            self.entries
                .range((Bound::Included(low), Bound::Included(high)))
                .flat_map(|(_, ids)| ids.iter().copied())
                .collect(),
        )
    }
}

#[derive(Debug, Default)]
struct Collection {
    next_id: DocId,
    documents: BTreeMap<DocId, Value>,
    indexes: BTreeMap<String, PathIndex>,
}

impl Collection {
    fn index_document(&mut self, id: DocId) {
        if let Some(document) = self.documents.get(&id) {
            for (path, index) in self.indexes.iter_mut() {
                index.insert(path, id, document);
            }
        }
    }

    fn unindex_document(&mut self, id: DocId) {
        if let Some(document) = self.documents.get(&id) {
            for (path, index) in self.indexes.iter_mut() {
                index.remove(path, id, document);
            }
        }
    }

    /// Ids that may match `filter`, or `None` when no index applies.
    fn candidates(&self, filter: &Filter) -> Option<BTreeSet<DocId>> {
        match filter {
            Filter::Eq(path, value) => {
                let ids = self.indexes.get(path)?.lookup_eq(value)?;
                debug!("Eq lookup on index {} yields {} candidates", path, ids.len());
                Some(ids)
            }
            Filter::Range { path, gte, lt } => {
                let ids = self
                    .indexes
                    .get(path)?
                    .lookup_range(gte.as_ref()?, lt.as_ref()?)?;
                debug!("Range lookup on index {} yields {} candidates", path, ids.len());
                Some(ids)
            }
            Filter::And(filters) => filters
                .iter()
                .filter_map(|f| self.candidates(f))
                .reduce(|a, b| a.intersection(&b).copied().collect()),
            Filter::Exists(_) => None,
        }
    }

    fn matching_ids(&self, filter: &Filter) -> Vec<DocId> {
        match self.candidates(filter) {
            Some(ids) => ids
                .into_iter()
                .filter(|id| self.documents.get(id).is_some_and(|d| filter.matches(d)))
                .collect(),
            None => self
                .documents
                .iter()
                .filter(|(_, d)| filter.matches(d))
                .map(|(id, _)| *id)
                .collect(),
        }
    }

    fn update(&mut self, id: DocId, update: &Update) -> Result<bool> {
        self.unindex_document(id);
        let result = match self.documents.get_mut(&id) {
            Some(document) => update.apply(document),
            None => Ok(false),
        };
        self.index_document(id);
        result
    }
}

#[derive(Serialize, Deserialize, Default)]
struct CollectionFile {
    next_id: DocId,
    indexes: Vec<String>,
    documents: Vec<Value>,
}

#[derive(Serialize, Deserialize, Default)]
struct StoreFile {
    collections: BTreeMap<String, CollectionFile>,
}

pub struct DocumentStore {
    path: Option<PathBuf>,
    collections: BTreeMap<String, Collection>,
}

impl DocumentStore {
    /// Open the store backed by `path`. A missing file is an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut store = DocumentStore {
            path: Some(path.clone()),
            collections: BTreeMap::new(),
        };
        if !path.exists() {
            info!("Document store {:?} does not exist yet, starting empty", path);
            return Ok(store);
        }

        let file = File::open(&path)
            .with_context(|| format!("Failed to open document store {:?}", path))?;
        let contents: StoreFile = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse document store {:?}", path))?;

        for (name, file_collection) in contents.collections {
            let mut collection = Collection {
                next_id: file_collection.next_id,
                ..Default::default()
            };
            for document in file_collection.documents {
                let id = document
                    .get(ID_FIELD)
                    .and_then(Value::as_u64)
                    .with_context(|| format!("Document without {} in {}", ID_FIELD, name))?;
                collection.next_id = collection.next_id.max(id + 1);
                collection.documents.insert(id, document);
            }
            store.collections.insert(name.clone(), collection);
            for index_path in file_collection.indexes {
                store.create_index(&name, &index_path);
            }
        }
        Ok(store)
    }

    pub fn in_memory() -> Self {
        DocumentStore {
            path: None,
            collections: BTreeMap::new(),
        }
    }

    /// Write every collection to the backing file. No-op for in-memory stores.
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let contents = StoreFile {
            collections: self
                .collections
                .iter()
                .map(|(name, collection)| {
                    (
                        name.clone(),
                        CollectionFile {
                            next_id: collection.next_id,
                            indexes: collection.indexes.keys().cloned().collect(),
                            documents: collection.documents.values().cloned().collect(),
                        },
                    )
                })
                .collect(),
        };

        let tmp_path = path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)
                .with_context(|| format!("Failed to create {:?}", tmp_path))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &contents)?;
            writer.flush()?;
        }
        fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to replace document store {:?}", path))?;
        debug!("Flushed document store to {:?}", path);
        Ok(())
    }

    /// Insert `documents`, assigning each a fresh `_id`. Returns the ids in input order.
    pub fn insert_many(&mut self, collection: &str, documents: Vec<Value>) -> Result<Vec<DocId>> {
        if let Some(position) = documents.iter().position(|d| !d.is_object()) {
            bail!(
                "Document {} for collection {} is not an object",
                position,
                collection
            );
        }

        let coll = self.collections.entry(collection.to_string()).or_default();
        let mut ids = Vec::with_capacity(documents.len());
        for mut document in documents {
            let id = coll.next_id;
            coll.next_id += 1;
            set_path(&mut document, ID_FIELD, Value::from(id));
            coll.documents.insert(id, document);
            coll.index_document(id);
            ids.push(id);
        }
        Ok(ids)
    }

    /// Run an aggregation pipeline. A leading match stage is served from an
    /// index when one covers its path.
    pub fn aggregate(&self, collection: &str, stages: &[Stage]) -> Result<Vec<Value>> {
        let Some(coll) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let documents: Vec<Value> = match stages.first() {
            Some(Stage::Match(filter)) => coll
                .matching_ids(filter)
                .into_iter()
                .filter_map(|id| coll.documents.get(&id).cloned())
                .collect(),
            _ => coll.documents.values().cloned().collect(),
        };
        pipeline::run(documents, stages)
            .with_context(|| format!("Aggregation over {} failed", collection))
    }

    pub fn find(&self, collection: &str, filter: &Filter) -> Vec<Value> {
        let Some(coll) = self.collections.get(collection) else {
            return Vec::new();
        };
        coll.matching_ids(filter)
            .into_iter()
            .filter_map(|id| coll.documents.get(&id).cloned())
            .collect()
    }

    pub fn find_one(&self, collection: &str, filter: &Filter) -> Option<Value> {
        let coll = self.collections.get(collection)?;
        coll.matching_ids(filter)
            .first()
            .and_then(|id| coll.documents.get(id).cloned())
    }

    /// Apply `update` to the first matching document. Returns whether a
    /// document changed.
    pub fn update_one(&mut self, collection: &str, filter: &Filter, update: &Update) -> Result<bool> {
        let Some(coll) = self.collections.get_mut(collection) else {
            return Ok(false);
        };
        match coll.matching_ids(filter).first() {
            Some(id) => coll.update(*id, update),
            None => Ok(false),
        }
    }

    pub fn update_by_id(&mut self, collection: &str, id: DocId, update: &Update) -> Result<bool> {
        match self.collections.get_mut(collection) {
            Some(coll) => coll.update(id, update),
            None => Ok(false),
        }
    }

    /// Apply `update` to every matching document. Returns how many changed.
    pub fn update_many(
        &mut self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<usize> {
        let Some(coll) = self.collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut modified = 0;
        for id in coll.matching_ids(filter) {
            if coll.update(id, update)? {
                modified += 1;
            }
        }
        Ok(modified)
    }

    /// Create a lookup index on `path`. Returns false if it already existed.
    pub fn create_index(&mut self, collection: &str, path: &str) -> bool {
        let coll = self.collections.entry(collection.to_string()).or_default();
        if coll.indexes.contains_key(path) {
            return false;
        }
        let mut index = PathIndex::default();
        for (id, document) in &coll.documents {
            index.insert(path, *id, document);
        }
        debug!(
            "Built index {}.{} with {} keys",
            collection,
            path,
            index.entries.len()
        );
        coll.indexes.insert(path.to_string(), index);
        true
    }

    pub fn drop_indexes(&mut self, collection: &str) -> usize {
        self.collections
            .get_mut(collection)
            .map(|coll| std::mem::take(&mut coll.indexes).len())
            .unwrap_or(0)
    }

    pub fn index_paths(&self, collection: &str) -> Vec<String> {
        self.collections
            .get(collection)
            .map(|coll| coll.indexes.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn drop_collection(&mut self, collection: &str) -> bool {
        self.collections.remove(collection).is_some()
    }

    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|coll| coll.documents.len())
            .unwrap_or(0)
    }
}
