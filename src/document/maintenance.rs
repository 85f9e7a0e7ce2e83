//! Targeted changes to the embedded albums of band documents.

use super::ingest::BANDS_COLLECTION;
use super::pipeline::{Filter, SortOrder, Stage};
use super::projector::AlbumEntry;
use super::store::{DocumentStore, Update};
use crate::source::Album;
use crate::temporal::CalendarDate;
use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

/// Highest sales figure of any embedded album, if any album has one.
pub fn highest_album_sales(store: &DocumentStore) -> Result<Option<i64>> {
    let top = store.aggregate(
        BANDS_COLLECTION,
        &[
            Stage::Unwind("albums".to_string()),
            Stage::Sort(vec![("albums.sales".to_string(), SortOrder::Descending)]),
            Stage::Limit(1),
            Stage::Project(vec!["albums.sales".to_string()]),
        ],
    )?;
    Ok(top
        .first()
        .and_then(|doc| doc.pointer("/albums/sales"))
        .and_then(Value::as_i64))
}

/// Append `album` to the band at `band_url` under a fresh album id.
/// Returns the id, or `None` when no such band exists.
pub fn push_album(store: &mut DocumentStore, band_url: &str, album: &Album) -> Result<Option<String>> {
    let entry = AlbumEntry::from_album(album);
    let album_id = entry.album_id.clone();
    let value = serde_json::to_value(&entry).context("Failed to serialize album")?;

    let pushed = store.update_one(
        BANDS_COLLECTION,
        &Filter::eq("band_url", band_url),
        &Update::Push("albums".to_string(), value),
    )?;
    if !pushed {
        return Ok(None);
    }
    info!("Added album {} to band {}", album_id, band_url);
    Ok(Some(album_id))
}

/// Append an album that outsells every album currently stored.
pub fn insert_record_album(
    store: &mut DocumentStore,
    band_url: &str,
    name: &str,
    release_date: Option<CalendarDate>,
) -> Result<Option<String>> {
    let record = highest_album_sales(store)?.unwrap_or(0).saturating_add(1);
    let album = Album {
        name: Some(name.to_string()),
        release_date,
        description: None,
        running_time: None,
        sales: Some(record),
    };
    push_album(store, band_url, &album)
}

/// Remove the album with `album_id` from the band at `band_url`.
pub fn pull_album(store: &mut DocumentStore, band_url: &str, album_id: &str) -> Result<bool> {
    let pulled = store.update_one(
        BANDS_COLLECTION,
        &Filter::eq("band_url", band_url),
        &Update::PullById {
            array: "albums".to_string(),
            id_field: "album_id".to_string(),
            id: Value::String(album_id.to_string()),
        },
    )?;
    if pulled {
        info!("Removed album {} from band {}", album_id, band_url);
    }
    Ok(pulled)
}
