//! Natural key to surrogate id resolution.
//!
//! Surrogate ids are generated by the relational store at insert time and
//! returned in input order. An [`IdentityMap`] zips those ids with the natural
//! keys that were inserted, and is the only way association rows obtain ids.
//! The maps belong to one ingestion run and are dropped with it.

use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("table {table}: {keys} natural keys but {ids} generated ids")]
    CountMismatch {
        table: &'static str,
        keys: usize,
        ids: usize,
    },

    #[error("table {table}: natural key '{key}' was inserted more than once")]
    DuplicateKey { table: &'static str, key: String },

    #[error("table {table}: surrogate id {id} was returned for more than one key")]
    DuplicateId { table: &'static str, id: i64 },

    #[error("table {table}: no surrogate id for natural key '{key}'")]
    DanglingReference { table: &'static str, key: String },
}

#[derive(Clone, Debug)]
pub struct IdentityMap {
    table: &'static str,
    ids: HashMap<String, i64>,
}

impl IdentityMap {
    /// Build the mapping for `table` from the inserted keys and the ids the
    /// store returned for them, both in insertion order.
    pub fn allocate<K: AsRef<str>>(
        table: &'static str,
        natural_keys: &[K],
        generated_ids: &[i64],
    ) -> Result<Self, IdentityError> {
        if natural_keys.len() != generated_ids.len() {
            return Err(IdentityError::CountMismatch {
                table,
                keys: natural_keys.len(),
                ids: generated_ids.len(),
            });
        }

        let mut ids = HashMap::with_capacity(natural_keys.len());
        let mut seen_ids = HashSet::with_capacity(generated_ids.len());
        for (key, id) in natural_keys.iter().zip(generated_ids.iter().copied()) {
            if !seen_ids.insert(id) {
                return Err(IdentityError::DuplicateId { table, id });
            }
            if ids.insert(key.as_ref().to_string(), id).is_some() {
                return Err(IdentityError::DuplicateKey {
                    table,
                    key: key.as_ref().to_string(),
                });
            }
        }
        Ok(IdentityMap { table, ids })
    }

    pub fn resolve(&self, key: &str) -> Result<i64, IdentityError> {
        self.ids
            .get(key)
            .copied()
            .ok_or_else(|| IdentityError::DanglingReference {
                table: self.table,
                key: key.to_string(),
            })
    }
}

/// The identity maps needed to build association rows.
#[derive(Clone, Debug)]
pub struct IdentityMaps {
    pub bands: IdentityMap,
    pub genres: IdentityMap,
    pub musicians: IdentityMap,
}
