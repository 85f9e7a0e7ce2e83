//! Two-phase write of canonical band records into a [`RelationalStore`].
//!
//! Entity tables are written first and the ids they return feed the identity
//! maps; association tables are written afterwards from those maps. Each table
//! is one batch in its own transaction, and the first failing batch stops the run.

use super::projector::{AssociationTuples, EntityTuples};
use super::schema::{
    ALBUMS_TABLE, BANDS_TABLE, GENRES_TABLE, HAS_GENRE_TABLE, HAS_NAME_TABLE, MEMBER_OF_TABLE,
    MUSICIANS_TABLE,
};
use super::store::RelationalStore;
use crate::error::IngestError;
use crate::identity::{IdentityMap, IdentityMaps};
use crate::source::Band;
use crate::sqlite_persistence::Table;
use rusqlite::types::Value;
use std::fmt;
use tracing::info;

/// Rows written per table by one ingestion run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub bands: usize,
    pub genres: usize,
    pub musicians: usize,
    pub albums: usize,
    pub has_genre: usize,
    pub member_of: usize,
    pub has_name: usize,
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bands, {} genres, {} musicians, {} albums, {} has_genre, {} member_of, {} has_name",
            self.bands,
            self.genres,
            self.musicians,
            self.albums,
            self.has_genre,
            self.member_of,
            self.has_name
        )
    }
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn optional<T, F: FnOnce(T) -> Value>(value: Option<T>, convert: F) -> Value {
    value.map(convert).unwrap_or(Value::Null)
}

fn insert_batch<S: RelationalStore>(
    store: &S,
    table: &Table,
    rows: Vec<Vec<Value>>,
) -> Result<Vec<i64>, IngestError> {
    let ids = store
        .bulk_insert(table, &rows)
        .map_err(IngestError::stage(table.name))?;
    info!("Inserted {} rows into {} table", ids.len(), table.name);
    Ok(ids)
}

pub fn ingest<S: RelationalStore>(store: &S, bands: &[Band]) -> Result<IngestSummary, IngestError> {
    let mut summary = IngestSummary::default();

    let entities = EntityTuples::project(bands);

    let band_ids = insert_batch(
        store,
        &BANDS_TABLE,
        entities
            .bands
            .iter()
            .map(|b| vec![text(&b.url), text(&b.name)])
            .collect(),
    )?;
    let genre_ids = insert_batch(
        store,
        &GENRES_TABLE,
        entities.genres.iter().map(|g| vec![text(g)]).collect(),
    )?;
    let musician_ids = insert_batch(
        store,
        &MUSICIANS_TABLE,
        entities.musicians.iter().map(|m| vec![text(m)]).collect(),
    )?;
    summary.bands = band_ids.len();
    summary.genres = genre_ids.len();
    summary.musicians = musician_ids.len();

    let maps = IdentityMaps {
        bands: IdentityMap::allocate(BANDS_TABLE.name, &entities.band_urls(), &band_ids)?,
        genres: IdentityMap::allocate(GENRES_TABLE.name, &entities.genres, &genre_ids)?,
        musicians: IdentityMap::allocate(
            MUSICIANS_TABLE.name,
            &entities.musicians,
            &musician_ids,
        )?,
    };

    let associations = AssociationTuples::project(bands, &maps)?;

    summary.albums = insert_batch(
        store,
        &ALBUMS_TABLE,
        associations
            .albums
            .iter()
            .map(|a| {
                vec![
                    Value::Integer(a.band_id),
                    optional(a.name.as_deref(), text),
                    optional(a.release_date, |d| Value::Text(d.to_relational_text())),
                    optional(a.description.as_deref(), text),
                    optional(a.running_time, Value::Real),
                    optional(a.sales, Value::Integer),
                ]
            })
            .collect(),
    )?
    .len();

    summary.has_genre = insert_batch(
        store,
        &HAS_GENRE_TABLE,
        associations
            .has_genre
            .iter()
            .map(|t| vec![Value::Integer(t.band_id), Value::Integer(t.genre_id)])
            .collect(),
    )?
    .len();

    summary.member_of = insert_batch(
        store,
        &MEMBER_OF_TABLE,
        associations
            .member_of
            .iter()
            .map(|t| {
                vec![
                    Value::Integer(t.musician_id),
                    Value::Integer(t.band_id),
                    Value::Integer(t.active as i64),
                ]
            })
            .collect(),
    )?
    .len();

    summary.has_name = insert_batch(
        store,
        &HAS_NAME_TABLE,
        associations
            .has_name
            .iter()
            .map(|t| vec![Value::Integer(t.musician_id), text(&t.name)])
            .collect(),
    )?
    .len();

    info!("Relational ingestion complete: {}", summary);
    Ok(summary)
}
