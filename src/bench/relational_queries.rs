//! Benchmark query variants against the relational store.
//!
//! * L0 joins albums to genres and bands on every query.
//! * L1 is the same SQL with indexes on the release date and the join keys.
//! * L2 reads per band window sales from the `band_window_sales` table,
//!   materialized from albums and indexed on its window label.
//! * L3 reads the stored answer from `precomputed_answers`.

use super::harness::{BenchError, BenchTarget};
use super::levels::{OptimizationLevel, TimeWindow, TopAnswer};
use crate::relational::{RelationalStore, SqliteRelationalStore};
use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table};
use anyhow::{bail, Result};
use rusqlite::types::Value;
use std::path::PathBuf;
use tracing::info;

const TARGET_NAME: &str = "relational";

pub const WINDOW_SALES_TABLE: &str = "band_window_sales";

pub const PRECOMPUTED_ANSWERS_TABLE: Table = Table {
    name: "precomputed_answers",
    columns: &[
        sqlite_column!("answer_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("answer_name", &SqlType::Text, non_null = true),
        sqlite_column!("genre_name", &SqlType::Text, non_null = true),
        sqlite_column!("band_url", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["answer_name"]],
};

const TOP_ANSWER_NAME: &str = "top_band_of_top_genre";

/// (index name, table, columns) created at L1.
const JOIN_INDEXES: &[(&str, &str, &[&str])] = &[
    ("idx_albums_release_date", "albums", &["release_date"]),
    ("idx_albums_band_id", "albums", &["band_id"]),
    ("idx_has_genre_band_id", "has_genre", &["band_id"]),
    ("idx_has_genre_genre_id", "has_genre", &["genre_id"]),
];

const INDEXED_TABLES: &[&str] = &["albums", "has_genre", "genres", "bands"];

const GENRE_BY_JOIN_SQL: &str = "
    SELECT g.genre_name, COALESCE(SUM(a.sales), 0) AS total
    FROM albums a
    JOIN has_genre hg ON hg.band_id = a.band_id
    JOIN genres g ON g.genre_id = hg.genre_id
    WHERE a.release_date >= ?1 AND a.release_date < ?2
    GROUP BY g.genre_id
    ORDER BY total DESC, g.genre_name ASC
    LIMIT 1";

const BAND_BY_JOIN_SQL: &str = "
    SELECT b.band_url, COALESCE(SUM(a.sales), 0) AS total
    FROM albums a
    JOIN bands b ON b.band_id = a.band_id
    WHERE a.release_date >= ?1 AND a.release_date < ?2
      AND EXISTS (
        SELECT 1 FROM has_genre hg
        JOIN genres g ON g.genre_id = hg.genre_id
        WHERE hg.band_id = a.band_id AND g.genre_name = ?3)
    GROUP BY b.band_id
    ORDER BY total DESC, b.band_url ASC
    LIMIT 1";

const GENRE_BY_WINDOW_SALES_SQL: &str = "
    SELECT g.genre_name, SUM(w.sales) AS total
    FROM band_window_sales w
    JOIN has_genre hg ON hg.band_id = w.band_id
    JOIN genres g ON g.genre_id = hg.genre_id
    WHERE w.window_label = ?1
    GROUP BY g.genre_id
    ORDER BY total DESC, g.genre_name ASC
    LIMIT 1";

const BAND_BY_WINDOW_SALES_SQL: &str = "
    SELECT b.band_url, w.sales AS total
    FROM band_window_sales w
    JOIN bands b ON b.band_id = w.band_id
    WHERE w.window_label = ?1
      AND EXISTS (
        SELECT 1 FROM has_genre hg
        JOIN genres g ON g.genre_id = hg.genre_id
        WHERE hg.band_id = w.band_id AND g.genre_name = ?2)
    ORDER BY total DESC, b.band_url ASC
    LIMIT 1";

const ANSWER_SQL: &str =
    "SELECT genre_name, band_url FROM precomputed_answers WHERE answer_name = ?1";

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn window_bounds(window: &TimeWindow) -> [Value; 2] {
    [
        text(&window.start.to_relational_text()),
        text(&window.end.to_relational_text()),
    ]
}

fn window_sales_select(window: &TimeWindow) -> String {
    format!(
        "SELECT a.band_id AS band_id, '{label}' AS window_label, COALESCE(SUM(a.sales), 0) AS sales \
         FROM albums a \
         WHERE a.release_date >= '{start}' AND a.release_date < '{end}' \
         GROUP BY a.band_id",
        label = window.label,
        start = window.start.to_relational_text(),
        end = window.end.to_relational_text()
    )
}

fn is_integer_overflow(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(_, Some(message))) if message == "integer overflow"
        )
    })
}

/// SQLite's `SUM` fails once an integer total leaves the `i64` range; that
/// failure is reported as [`BenchError::SalesOverflow`].
fn overflow_as_bench_error<T>(
    result: Result<T>,
    level: OptimizationLevel,
    query: &'static str,
) -> Result<T> {
    result.map_err(|err| {
        if is_integer_overflow(&err) {
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

fn query_sales<S: RelationalStore>(
    store: &S,
    sql: &str,
    params: &[Value],
    level: OptimizationLevel,
    query: &'static str,
) -> Result<Vec<Vec<Value>>> {
    overflow_as_bench_error(store.query_rows(sql, params), level, query)
}

/// First column of the single result row, as text.
fn top_text(
    rows: Vec<Vec<Value>>,
    level: OptimizationLevel,
    query: &'static str,
) -> Result<String> {
    match rows.into_iter().next().and_then(|row| row.into_iter().next()) {
        Some(Value::Text(text)) => Ok(text),
        Some(other) => bail!("{} returned a non-text value: {:?}", query, other),
        None => Err(BenchError::EmptyResult {
            target: TARGET_NAME,
            level,
            query,
        }
        .into()),
    }
}

fn answer_by_join<S: RelationalStore>(store: &S, level: OptimizationLevel) -> Result<TopAnswer> {
    let genre = top_text(
        query_sales(
            store,
            GENRE_BY_JOIN_SQL,
            &window_bounds(&TimeWindow::early_decade()),
            level,
            "get_genre",
        )?,
        level,
        "get_genre",
    )?;

    let [start, end] = window_bounds(&TimeWindow::late_decade());
    let band_url = top_text(
        query_sales(
            store,
            BAND_BY_JOIN_SQL,
            &[start, end, text(&genre)],
            level,
            "get_band",
        )?,
        level,
        "get_band",
    )?;
    Ok(TopAnswer { genre, band_url })
}

fn answer_by_window_sales<S: RelationalStore>(
    store: &S,
    level: OptimizationLevel,
) -> Result<TopAnswer> {
    let genre = top_text(
        query_sales(
            store,
            GENRE_BY_WINDOW_SALES_SQL,
            &[text(TimeWindow::early_decade().label)],
            level,
            "get_genre",
        )?,
        level,
        "get_genre",
    )?;
    let band_url = top_text(
        query_sales(
            store,
            BAND_BY_WINDOW_SALES_SQL,
            &[text(TimeWindow::late_decade().label), text(&genre)],
            level,
            "get_band",
        )?,
        level,
        "get_band",
    )?;
    Ok(TopAnswer { genre, band_url })
}

fn stored_answer<S: RelationalStore>(store: &S, level: OptimizationLevel) -> Result<TopAnswer> {
    let rows = store.query_rows(ANSWER_SQL, &[text(TOP_ANSWER_NAME)])?;
    match rows.into_iter().next().as_deref() {
        Some([Value::Text(genre), Value::Text(band_url)]) => Ok(TopAnswer {
            genre: genre.clone(),
            band_url: band_url.clone(),
        }),
        Some(other) => bail!("Malformed precomputed answer row: {:?}", other),
        None => Err(BenchError::EmptyResult {
            target: TARGET_NAME,
            level,
            query: "precomputed_answers",
        }
        .into()),
    }
}

fn reset<S: RelationalStore>(store: &S) -> Result<()> {
    let mut dropped = 0;
    for table in INDEXED_TABLES {
        dropped += store.drop_indexes(table)?;
    }
    store.drop_table(WINDOW_SALES_TABLE)?;
    store.drop_table(PRECOMPUTED_ANSWERS_TABLE.name)?;
    info!("Reset relational store to baseline ({} indexes dropped)", dropped);
    Ok(())
}

pub struct RelationalTarget {
    db_path: PathBuf,
}

impl RelationalTarget {
    pub fn new<P: Into<PathBuf>>(db_path: P) -> Self {
        RelationalTarget {
            db_path: db_path.into(),
        }
    }
}

impl BenchTarget for RelationalTarget {
    type Session = SqliteRelationalStore;

    fn name(&self) -> &'static str {
        TARGET_NAME
    }

    fn connect(&self) -> Result<Self::Session> {
        SqliteRelationalStore::open(&self.db_path)
    }

    fn prepare(&self, level: OptimizationLevel) -> Result<()> {
        let store = self.connect()?;
        reset(&store)?;

        if level.includes(OptimizationLevel::Indexed) {
            for (name, table, columns) in JOIN_INDEXES {
                store.create_index(name, table, columns)?;
            }
        }

        if level.includes(OptimizationLevel::Precomputed) {
            let select = TimeWindow::all()
                .iter()
                .map(window_sales_select)
                .collect::<Vec<_>>()
                .join(" UNION ALL ");
            overflow_as_bench_error(
                store.materialize_view(WINDOW_SALES_TABLE, &select),
                level,
                "band_window_sales",
            )?;
            store.create_index(
                "idx_band_window_sales_window",
                WINDOW_SALES_TABLE,
                &["window_label", "band_id"],
            )?;
        }

        if level.includes(OptimizationLevel::FullyPrecomputed) {
            let answer = answer_by_window_sales(&store, level)?;
            store.create_table(&PRECOMPUTED_ANSWERS_TABLE)?;
            store.bulk_insert(
                &PRECOMPUTED_ANSWERS_TABLE,
                &[vec![
                    text(TOP_ANSWER_NAME),
                    text(&answer.genre),
                    text(&answer.band_url),
                ]],
            )?;
        }

        info!("Prepared relational store at {}", level);
        Ok(())
    }

    fn answer(&self, session: &mut Self::Session, level: OptimizationLevel) -> Result<TopAnswer> {
        match level {
            OptimizationLevel::Baseline | OptimizationLevel::Indexed => {
                answer_by_join(session, level)
            }
            OptimizationLevel::Precomputed => answer_by_window_sales(session, level),
            OptimizationLevel::FullyPrecomputed => stored_answer(session, level),
        }
    }
}
