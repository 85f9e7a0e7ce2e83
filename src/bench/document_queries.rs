//! Benchmark query variants against the document store.
//!
//! * L0 unwinds and regroups the embedded albums on every query.
//! * L1 runs the same pipelines with indexes on `albums.release_date` and
//!   `genres.genre_name` serving their leading match.
//! * L2 reads per band window sales stored on each band document.
//! * L3 reads the stored answer from the `precomputed_answers` collection.

use super::harness::{BenchError, BenchTarget};
use super::levels::{OptimizationLevel, TimeWindow, TopAnswer};
use crate::document::maintenance::insert_record_album;
use crate::document::store::ID_FIELD;
use crate::document::{
    Accumulator, DocumentStore, Filter, PipelineError, SortOrder, Stage, Update,
    BANDS_COLLECTION,
};
use crate::temporal::CalendarDate;
use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

const TARGET_NAME: &str = "documents";

pub const PRECOMPUTED_ANSWERS_COLLECTION: &str = "precomputed_answers";

const TOP_ANSWER_NAME: &str = "top_band_of_top_genre";

const INDEXED_PATHS: &[&str] = &["albums.release_date", "genres.genre_name"];

/// Band document field holding the band's sales in `window`.
pub fn window_sales_field(window: &TimeWindow) -> String {
    format!("band_sales_{}", window.label)
}

fn window_filter(window: &TimeWindow) -> Filter {
    Filter::range(
        "albums.release_date",
        window.start.to_document_text(),
        window.end.to_document_text(),
    )
}

fn key(name: &str, path: &str) -> (String, String) {
    (name.to_string(), path.to_string())
}

fn acc(name: &str, accumulator: Accumulator) -> (String, Accumulator) {
    (name.to_string(), accumulator)
}

fn sum(path: &str) -> Accumulator {
    Accumulator::Sum(path.to_string())
}

fn first(path: &str) -> Accumulator {
    Accumulator::First(path.to_string())
}

fn sort(fields: &[(&str, SortOrder)]) -> Stage {
    Stage::Sort(
        fields
            .iter()
            .map(|(path, order)| (path.to_string(), *order))
            .collect(),
    )
}

/// Albums of `window` summed per band document, keyed `{"band": _id}`.
fn band_sales_stages(window: &TimeWindow) -> Vec<Stage> {
    vec![
        Stage::Match(window_filter(window)),
        Stage::Unwind("albums".to_string()),
        Stage::Match(window_filter(window)),
        Stage::Group {
            key: vec![key("band", ID_FIELD)],
            fields: vec![
                acc("band_sales", sum("albums.sales")),
                acc("genres", first("genres")),
            ],
        },
    ]
}

/// Top genre of the early window, summing each band once per distinct genre.
pub fn genre_by_unwind() -> Vec<Stage> {
    let mut stages = band_sales_stages(&TimeWindow::early_decade());
    stages.extend([
        Stage::Unwind("genres".to_string()),
        Stage::Group {
            key: vec![key("band", "_id.band"), key("genre", "genres.genre_name")],
            fields: vec![acc("band_sales", first("band_sales"))],
        },
        Stage::Group {
            key: vec![key("genre", "_id.genre")],
            fields: vec![acc("genre_sales", sum("band_sales"))],
        },
        sort(&[
            ("genre_sales", SortOrder::Descending),
            ("_id.genre", SortOrder::Ascending),
        ]),
        Stage::Limit(1),
    ]);
    stages
}

/// Top band of `genre` in `window`.
pub fn band_by_unwind(window: &TimeWindow, genre: &str) -> Vec<Stage> {
    vec![
        Stage::Match(Filter::And(vec![
            Filter::eq("genres.genre_name", genre),
            window_filter(window),
        ])),
        Stage::Unwind("albums".to_string()),
        Stage::Match(window_filter(window)),
        Stage::Group {
            key: vec![key("band", "band_url")],
            fields: vec![acc("band_sales", sum("albums.sales"))],
        },
        sort(&[
            ("band_sales", SortOrder::Descending),
            ("_id.band", SortOrder::Ascending),
        ]),
        Stage::Limit(1),
    ]
}

pub fn genre_by_stored_sales() -> Vec<Stage> {
    let field = window_sales_field(&TimeWindow::early_decade());
    vec![
        Stage::Match(Filter::exists(&field)),
        Stage::Unwind("genres".to_string()),
        Stage::Group {
            key: vec![key("band", ID_FIELD), key("genre", "genres.genre_name")],
            fields: vec![acc("band_sales", first(&field))],
        },
        Stage::Group {
            key: vec![key("genre", "_id.genre")],
            fields: vec![acc("genre_sales", sum("band_sales"))],
        },
        sort(&[
            ("genre_sales", SortOrder::Descending),
            ("_id.genre", SortOrder::Ascending),
        ]),
        Stage::Limit(1),
    ]
}

pub fn band_by_stored_sales(genre: &str) -> Vec<Stage> {
    let field = window_sales_field(&TimeWindow::late_decade());
    vec![
        Stage::Match(Filter::And(vec![
            Filter::eq("genres.genre_name", genre),
            Filter::exists(&field),
        ])),
        sort(&[
            (field.as_str(), SortOrder::Descending),
            ("band_url", SortOrder::Ascending),
        ]),
        Stage::Limit(1),
    ]
}

/// Runs `stages` over the band documents. A sum leaving the integer range is
/// reported as [`BenchError::SalesOverflow`], as the relational store does.
fn aggregate_bands(
    store: &DocumentStore,
    stages: &[Stage],
    level: OptimizationLevel,
    query: &'static str,
) -> Result<Vec<Value>> {
    store.aggregate(BANDS_COLLECTION, stages).map_err(|err| {
        if err.downcast_ref::<PipelineError>().is_some() {
            BenchError::SalesOverflow {
                target: TARGET_NAME,
                level,
                query,
            }
            .into()
        } else {
            err
        }
    })
}

fn top_text(
    results: Vec<Value>,
    path: &str,
    level: OptimizationLevel,
    query: &'static str,
) -> Result<String> {
    let Some(top) = results.into_iter().next() else {
        return Err(BenchError::EmptyResult {
            target: TARGET_NAME,
            level,
            query,
        }
        .into());
    };
    top.pointer(&format!("/{}", path.replace('.', "/")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .with_context(|| format!("{} result has no text at {}: {}", query, path, top))
}

fn answer_by_unwind(store: &DocumentStore, level: OptimizationLevel) -> Result<TopAnswer> {
    let genre = top_text(
        aggregate_bands(store, &genre_by_unwind(), level, "get_genre")?,
        "_id.genre",
        level,
        "get_genre",
    )?;
    let band_url = top_text(
        aggregate_bands(
            store,
            &band_by_unwind(&TimeWindow::late_decade(), &genre),
            level,
            "get_band",
        )?,
        "_id.band",
        level,
        "get_band",
    )?;
    Ok(TopAnswer { genre, band_url })
}

/// Where [`add_record_album_to_top_band`] put the new album.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordAlbum {
    pub genre: String,
    pub band_url: String,
    pub album_id: String,
}

/// Gives the top band of the early window's top genre a new album that
/// outsells every album in the catalog. The store is not flushed.
pub fn add_record_album_to_top_band(
    store: &mut DocumentStore,
    album_name: &str,
    release_date: Option<CalendarDate>,
) -> Result<RecordAlbum> {
    let level = OptimizationLevel::Baseline;
    let genre = top_text(
        aggregate_bands(store, &genre_by_unwind(), level, "get_genre")?,
        "_id.genre",
        level,
        "get_genre",
    )?;
    let band_url = top_text(
        aggregate_bands(
            store,
            &band_by_unwind(&TimeWindow::early_decade(), &genre),
            level,
            "get_band",
        )?,
        "_id.band",
        level,
        "get_band",
    )?;

    let Some(album_id) = insert_record_album(store, &band_url, album_name, release_date)? else {
        bail!("Band {} disappeared before its record album was added", band_url);
    };
    info!(
        "Added record album '{}' to {} (top {} band of {})",
        album_name,
        band_url,
        genre,
        TimeWindow::early_decade().label
    );
    Ok(RecordAlbum {
        genre,
        band_url,
        album_id,
    })
}

fn answer_by_stored_sales(store: &DocumentStore, level: OptimizationLevel) -> Result<TopAnswer> {
    let genre = top_text(
        aggregate_bands(store, &genre_by_stored_sales(), level, "get_genre")?,
        "_id.genre",
        level,
        "get_genre",
    )?;
    let band_url = top_text(
        aggregate_bands(store, &band_by_stored_sales(&genre), level, "get_band")?,
        "band_url",
        level,
        "get_band",
    )?;
    Ok(TopAnswer { genre, band_url })
}

fn stored_answer(store: &DocumentStore, level: OptimizationLevel) -> Result<TopAnswer> {
    let results: Vec<Value> = store
        .find_one(
            PRECOMPUTED_ANSWERS_COLLECTION,
            &Filter::eq("answer_name", TOP_ANSWER_NAME),
        )
        .into_iter()
        .collect();
    let genre = top_text(results.clone(), "genre_name", level, "precomputed_answers")?;
    let band_url = top_text(results, "band_url", level, "precomputed_answers")?;
    Ok(TopAnswer { genre, band_url })
}

/// Store each band's sales in every window on the band document. Bands
/// without albums in a window get no field for it.
fn store_window_sales(store: &mut DocumentStore, level: OptimizationLevel) -> Result<usize> {
    let mut updated = 0;
    for window in TimeWindow::all() {
        let field = window_sales_field(&window);
        let stages = band_sales_stages(&window);
        for group in aggregate_bands(store, &stages, level, "band_window_sales")? {
            let id = group
                .pointer("/_id/band")
                .and_then(Value::as_u64)
                .with_context(|| format!("Band group without document id: {}", group))?;
            let sales = group.get("band_sales").cloned().unwrap_or(Value::Null);
            if store.update_by_id(BANDS_COLLECTION, id, &Update::Set(field.clone(), sales))? {
                updated += 1;
            }
        }
    }
    Ok(updated)
}

fn reset(store: &mut DocumentStore) -> Result<()> {
    let dropped = store.drop_indexes(BANDS_COLLECTION);
    for window in TimeWindow::all() {
        let field = window_sales_field(&window);
        store.update_many(
            BANDS_COLLECTION,
            &Filter::exists(&field),
            &Update::Unset(field.clone()),
        )?;
    }
    store.drop_collection(PRECOMPUTED_ANSWERS_COLLECTION);
    info!("Reset document store to baseline ({} indexes dropped)", dropped);
    Ok(())
}

pub struct DocumentTarget {
    path: PathBuf,
}

impl DocumentTarget {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        DocumentTarget { path: path.into() }
    }
}

impl BenchTarget for DocumentTarget {
    type Session = DocumentStore;

    fn name(&self) -> &'static str {
        TARGET_NAME
    }

    fn connect(&self) -> Result<Self::Session> {
        DocumentStore::open(&self.path)
    }

    fn prepare(&self, level: OptimizationLevel) -> Result<()> {
        let mut store = self.connect()?;
        reset(&mut store)?;

        if level.includes(OptimizationLevel::Indexed) {
            for path in INDEXED_PATHS {
                store.create_index(BANDS_COLLECTION, path);
            }
        }

        if level.includes(OptimizationLevel::Precomputed) {
            let updated = store_window_sales(&mut store, level)?;
            info!("Stored window sales on {} band documents", updated);
        }

        if level.includes(OptimizationLevel::FullyPrecomputed) {
            let answer = answer_by_stored_sales(&store, level)?;
            store.insert_many(
                PRECOMPUTED_ANSWERS_COLLECTION,
                vec![json!({
                    "answer_name": TOP_ANSWER_NAME,
                    "genre_name": answer.genre,
                    "band_url": answer.band_url,
                })],
            )?;
            store.create_index(PRECOMPUTED_ANSWERS_COLLECTION, "answer_name");
        }

        store.flush()?;
        info!("Prepared document store at {}", level);
        Ok(())
    }

    fn answer(&self, session: &mut Self::Session, level: OptimizationLevel) -> Result<TopAnswer> {
        match level {
            OptimizationLevel::Baseline | OptimizationLevel::Indexed => {
                answer_by_unwind(session, level)
            }
            OptimizationLevel::Precomputed => answer_by_stored_sales(session, level),
            OptimizationLevel::FullyPrecomputed => stored_answer(session, level),
        }
    }
}
