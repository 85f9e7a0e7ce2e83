//! End-to-end tests for source extraction and ingestion into both models
//!
//! Covers the correspondence between the relational and the document form of
//! the same catalog, membership handling and date representations.

mod common;

use band_catalog::document::{Filter, BANDS_COLLECTION};
use band_catalog::error::IngestError;
use band_catalog::source::{extract, SourceTables};
use band_catalog::{document, relational, DocumentStore, RelationalStore, SqliteRelationalStore};
use common::*;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use std::collections::BTreeSet;

fn text(value: &SqlValue) -> String {
    match value {
        SqlValue::Text(text) => text.clone(),
        other => panic!("expected text, got {:?}", other),
    }
}

fn integer(value: &SqlValue) -> i64 {
    match value {
        SqlValue::Integer(value) => *value,
        other => panic!("expected integer, got {:?}", other),
    }
}

fn optional_text(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Null => None,
        other => Some(text(other)),
    }
}

fn optional_integer(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::Null => None,
        other => Some(integer(other)),
    }
}

fn optional_real(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Null => None,
        SqlValue::Real(value) => Some(value.to_string()),
        other => panic!("expected real, got {:?}", other),
    }
}

/// (band, album name, day, description, running time, sales) with the day as
/// `YYYY-MM-DD` and the running time rendered as text.
type AlbumFields = (
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<i64>,
);

fn all_documents(store: &DocumentStore) -> Vec<Value> {
    store.aggregate(BANDS_COLLECTION, &[]).unwrap()
}

fn band_document(store: &DocumentStore, band_url: &str) -> Value {
    store
        .find_one(BANDS_COLLECTION, &Filter::eq("band_url", band_url))
        .unwrap_or_else(|| panic!("no document for {}", band_url))
}

// =============================================================================
// Extraction
// =============================================================================

#[test]
fn test_extraction_skips_orphans_and_keeps_source_order() {
    let catalog = TestCatalog::with_sources().unwrap();
    let tables = SourceTables::load(&catalog.source_dir).unwrap();
    let extraction = extract(&tables);

    let urls: Vec<&str> = extraction.bands.iter().map(|b| b.url.as_str()).collect();
    assert_eq!(urls, vec![BAND_A_URL, BAND_B_URL, BAND_C_URL]);
    assert_eq!(extraction.orphan_rows, 1);
    assert_eq!(extraction.duplicate_bands, 0);

    let alpha = &extraction.bands[0];
    assert_eq!(alpha.name, BAND_A_NAME);
    assert_eq!(alpha.genres, vec!["Rock", "Rock", "Pop"]);
    assert_eq!(alpha.albums.len(), 4);

    let undated = alpha
        .albums
        .iter()
        .find(|a| a.name.as_deref() == Some(UNDATED_ALBUM))
        .unwrap();
    assert!(undated.release_date.is_none());
    assert!(undated.running_time.is_none());
    assert_eq!(undated.sales, Some(999999));
}

#[test]
fn test_missing_source_file_is_an_error() {
    let catalog = TestCatalog::with_sources().unwrap();
    std::fs::remove_file(
        catalog
            .source_dir
            .join(band_catalog::source::reader::ALBUMS_FILE),
    )
    .unwrap();

    let err = SourceTables::load(&catalog.source_dir).unwrap_err();
    assert!(err.to_string().contains("Failed to open source file"));
}

// =============================================================================
// Cross-model correspondence
// =============================================================================

#[test]
fn test_relational_row_counts() {
    let catalog = TestCatalog::imported().unwrap();
    let store = SqliteRelationalStore::open(&catalog.relational_db).unwrap();

    assert_eq!(store.count_rows("bands").unwrap(), 3);
    assert_eq!(store.count_rows("genres").unwrap(), 3);
    assert_eq!(store.count_rows("musicians").unwrap(), 2);
    assert_eq!(store.count_rows("albums").unwrap(), ALBUM_COUNT);
    assert_eq!(store.count_rows("has_genre").unwrap(), 5);
    assert_eq!(store.count_rows("member_of").unwrap(), 4);
    assert_eq!(store.count_rows("has_name").unwrap(), 3);
}

#[test]
fn test_band_genre_pairs_agree_across_models() {
    let catalog = TestCatalog::imported().unwrap();
    let relational_store = SqliteRelationalStore::open(&catalog.relational_db).unwrap();
    let document_store = DocumentStore::open(&catalog.document_db).unwrap();

    let relational_pairs: BTreeSet<(String, String)> = relational_store
        .query_rows(
            "SELECT b.band_url, g.genre_name FROM has_genre hg \
             JOIN bands b ON b.band_id = hg.band_id \
             JOIN genres g ON g.genre_id = hg.genre_id",
            &[],
        )
        .unwrap()
        .iter()
        .map(|row| (text(&row[0]), text(&row[1])))
        .collect();

    let document_pairs: BTreeSet<(String, String)> = all_documents(&document_store)
        .iter()
        .flat_map(|doc| {
            let url = doc["band_url"].as_str().unwrap().to_string();
            doc["genres"]
                .as_array()
                .unwrap()
                .iter()
                .map(move |g| (url.clone(), g["genre_name"].as_str().unwrap().to_string()))
                .collect::<Vec<_>>()
        })
        .collect();

    assert_eq!(relational_pairs, document_pairs);
    assert_eq!(relational_pairs.len(), 5);
}

#[test]
fn test_memberships_agree_across_models() {
    let catalog = TestCatalog::imported().unwrap();
    let relational_store = SqliteRelationalStore::open(&catalog.relational_db).unwrap();
    let document_store = DocumentStore::open(&catalog.document_db).unwrap();

    let relational_members: BTreeSet<(String, String, bool)> = relational_store
        .query_rows(
            "SELECT b.band_url, m.musician_url, mo.active FROM member_of mo \
             JOIN musicians m ON m.musician_id = mo.musician_id \
             JOIN bands b ON b.band_id = mo.band_id",
            &[],
        )
        .unwrap()
        .iter()
        .map(|row| (text(&row[0]), text(&row[1]), integer(&row[2]) != 0))
        .collect();

    let document_members: BTreeSet<(String, String, bool)> = all_documents(&document_store)
        .iter()
        .flat_map(|doc| {
            let url = doc["band_url"].as_str().unwrap().to_string();
            doc["members"]
                .as_array()
                .unwrap()
                .iter()
                .map(move |m| {
                    (
                        url.clone(),
                        m["member_url"].as_str().unwrap().to_string(),
                        m["active"].as_bool().unwrap(),
                    )
                })
                .collect::<Vec<_>>()
        })
        .collect();

    assert_eq!(relational_members, document_members);
    assert_eq!(relational_members.len(), 4);
}

#[test]
fn test_album_fields_agree_across_models() {
    let catalog = TestCatalog::imported().unwrap();
    let relational_store = SqliteRelationalStore::open(&catalog.relational_db).unwrap();
    let document_store = DocumentStore::open(&catalog.document_db).unwrap();

    let relational_albums: BTreeSet<AlbumFields> = relational_store
        .query_rows(
            "SELECT b.band_url, a.album_name, a.release_date, a.description, \
                    a.running_time, a.sales \
             FROM albums a JOIN bands b ON b.band_id = a.band_id",
            &[],
        )
        .unwrap()
        .iter()
        .map(|row| {
            (
                text(&row[0]),
                optional_text(&row[1]),
                optional_text(&row[2]),
                optional_text(&row[3]),
                optional_real(&row[4]),
                optional_integer(&row[5]),
            )
        })
        .collect();

    let document_albums: BTreeSet<AlbumFields> = all_documents(&document_store)
        .iter()
        .flat_map(|doc| {
            let url = doc["band_url"].as_str().unwrap().to_string();
            doc["albums"]
                .as_array()
                .unwrap()
                .iter()
                .map(move |a| {
                    // Documents hold midnight UTC of the same day
                    let day = a["release_date"].as_str().map(|instant| {
                        instant.strip_suffix("T00:00:00Z").unwrap().to_string()
                    });
                    (
                        url.clone(),
                        a["album_name"].as_str().map(str::to_string),
                        day,
                        a["description"].as_str().map(str::to_string),
                        a["running_time"].as_f64().map(|t| t.to_string()),
                        a["sales"].as_i64(),
                    )
                })
                .collect::<Vec<_>>()
        })
        .collect();

    assert_eq!(relational_albums, document_albums);
    assert_eq!(relational_albums.len(), ALBUM_COUNT);
    assert!(relational_albums.iter().any(|album| {
        album.1.as_deref() == Some("Gamma Zero")
            && album.3.as_deref() == Some("Millennium; remastered")
    }));
}

#[test]
fn test_repeated_genre_is_stored_once_relationally_but_kept_in_documents() {
    let catalog = TestCatalog::imported().unwrap();
    let relational_store = SqliteRelationalStore::open(&catalog.relational_db).unwrap();
    let document_store = DocumentStore::open(&catalog.document_db).unwrap();

    let rows = relational_store
        .query_rows(
            "SELECT COUNT(*) FROM has_genre hg \
             JOIN bands b ON b.band_id = hg.band_id \
             JOIN genres g ON g.genre_id = hg.genre_id \
             WHERE b.band_url = ?1 AND g.genre_name = 'Rock'",
            &[SqlValue::Text(BAND_A_URL.to_string())],
        )
        .unwrap();
    assert_eq!(integer(&rows[0][0]), 1);

    let alpha = band_document(&document_store, BAND_A_URL);
    let genres: Vec<&str> = alpha["genres"]
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["genre_name"].as_str().unwrap())
        .collect();
    assert_eq!(genres, vec!["Rock", "Rock", "Pop"]);
}

#[test]
fn test_every_band_has_one_document_with_all_albums() {
    let catalog = TestCatalog::imported().unwrap();
    let document_store = DocumentStore::open(&catalog.document_db).unwrap();

    let documents = all_documents(&document_store);
    assert_eq!(documents.len(), 3);

    let album_total: usize = documents
        .iter()
        .map(|doc| doc["albums"].as_array().unwrap().len())
        .sum();
    assert_eq!(album_total, ALBUM_COUNT);

    let album_ids: BTreeSet<&str> = documents
        .iter()
        .flat_map(|doc| doc["albums"].as_array().unwrap())
        .map(|album| album["album_id"].as_str().unwrap())
        .collect();
    assert_eq!(album_ids.len(), ALBUM_COUNT);
}

// =============================================================================
// Membership
// =============================================================================

#[test]
fn test_musician_is_one_entity_with_every_membership_and_name() {
    let catalog = TestCatalog::imported().unwrap();
    let store = SqliteRelationalStore::open(&catalog.relational_db).unwrap();

    let memberships: Vec<(String, i64)> = store
        .query_rows(
            "SELECT b.band_url, mo.active FROM member_of mo \
             JOIN musicians m ON m.musician_id = mo.musician_id \
             JOIN bands b ON b.band_id = mo.band_id \
             WHERE m.musician_url = ?1 \
             ORDER BY b.band_url, mo.active",
            &[SqlValue::Text(MUSICIAN_1_URL.to_string())],
        )
        .unwrap()
        .iter()
        .map(|row| (text(&row[0]), integer(&row[1])))
        .collect();
    assert_eq!(
        memberships,
        vec![
            (BAND_A_URL.to_string(), 0),
            (BAND_A_URL.to_string(), 1),
            (BAND_B_URL.to_string(), 1),
        ]
    );

    let names: BTreeSet<String> = store
        .query_rows(
            "SELECT hn.musician_name FROM has_name hn \
             JOIN musicians m ON m.musician_id = hn.musician_id \
             WHERE m.musician_url = ?1",
            &[SqlValue::Text(MUSICIAN_1_URL.to_string())],
        )
        .unwrap()
        .iter()
        .map(|row| text(&row[0]))
        .collect();
    assert_eq!(
        names,
        BTreeSet::from([MUSICIAN_1_NAME.to_string(), MUSICIAN_1_ALIAS.to_string()])
    );
}

#[test]
fn test_documents_embed_current_and_former_members() {
    let catalog = TestCatalog::imported().unwrap();
    let store = DocumentStore::open(&catalog.document_db).unwrap();

    let alpha = band_document(&store, BAND_A_URL);
    let members = alpha["members"].as_array().unwrap();
    assert_eq!(members.len(), 2);
    assert!(members
        .iter()
        .all(|m| m["member_url"] == MUSICIAN_1_URL && m["member_name"] == MUSICIAN_1_NAME));
    let flags: BTreeSet<bool> = members
        .iter()
        .map(|m| m["active"].as_bool().unwrap())
        .collect();
    assert_eq!(flags, BTreeSet::from([true, false]));

    let gamma = band_document(&store, BAND_C_URL);
    assert_eq!(gamma["members"][0]["member_url"], MUSICIAN_2_URL);
    assert_eq!(gamma["members"][0]["active"], false);
}

// =============================================================================
// Dates
// =============================================================================

#[test]
fn test_release_date_is_the_same_day_in_both_models() {
    let catalog = TestCatalog::imported().unwrap();
    let relational_store = SqliteRelationalStore::open(&catalog.relational_db).unwrap();
    let document_store = DocumentStore::open(&catalog.document_db).unwrap();

    let rows = relational_store
        .query_rows(
            "SELECT release_date FROM albums WHERE album_name = ?1",
            &[SqlValue::Text(CHRISTMAS_ALBUM.to_string())],
        )
        .unwrap();
    assert_eq!(text(&rows[0][0]), CHRISTMAS_RELATIONAL_DATE);

    let alpha = band_document(&document_store, BAND_A_URL);
    let album = alpha["albums"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["album_name"] == CHRISTMAS_ALBUM)
        .unwrap();
    assert_eq!(album["release_date"], CHRISTMAS_DOCUMENT_DATE);
}

#[test]
fn test_unparseable_date_is_null_in_both_models() {
    let catalog = TestCatalog::imported().unwrap();
    let relational_store = SqliteRelationalStore::open(&catalog.relational_db).unwrap();
    let document_store = DocumentStore::open(&catalog.document_db).unwrap();

    let rows = relational_store
        .query_rows(
            "SELECT release_date, sales FROM albums WHERE album_name = ?1",
            &[SqlValue::Text(UNDATED_ALBUM.to_string())],
        )
        .unwrap();
    assert_eq!(rows[0][0], SqlValue::Null);
    assert_eq!(integer(&rows[0][1]), 999999);

    let alpha = band_document(&document_store, BAND_A_URL);
    let album = alpha["albums"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["album_name"] == UNDATED_ALBUM)
        .unwrap();
    assert!(album["release_date"].is_null());
}

// =============================================================================
// Re-import
// =============================================================================

#[test]
fn test_second_relational_import_fails_without_partial_rows() {
    let catalog = TestCatalog::imported().unwrap();
    let bands = read_test_bands(&catalog.source_dir).unwrap();
    let store = SqliteRelationalStore::open(&catalog.relational_db).unwrap();

    match relational::ingest(&store, &bands) {
        Err(IngestError::Stage { stage, .. }) => assert_eq!(stage, "bands"),
        other => panic!("unexpected result: {:?}", other.map(|s| s.to_string())),
    }
    assert_eq!(store.count_rows("bands").unwrap(), 3);
    assert_eq!(store.count_rows("albums").unwrap(), ALBUM_COUNT);
}

#[test]
fn test_document_reimport_replaces_the_collection() {
    let catalog = TestCatalog::imported().unwrap();
    let bands = read_test_bands(&catalog.source_dir).unwrap();

    let mut store = DocumentStore::open(&catalog.document_db).unwrap();
    assert_eq!(document::ingest(&mut store, &bands).unwrap(), 3);

    let reopened = DocumentStore::open(&catalog.document_db).unwrap();
    assert_eq!(reopened.count(BANDS_COLLECTION), 3);
}
