//! SQLite schema of the normalized band catalog.
//!
//! Entity tables carry an integer surrogate id and a unique natural key.
//! Association tables reference surrogate ids only. No secondary indexes are
//! declared here: the benchmark adds them when it moves to the indexed level.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
};

const BAND_FK: ForeignKey = ForeignKey {
    foreign_table: "bands",
    foreign_column: "band_id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const GENRE_FK: ForeignKey = ForeignKey {
    foreign_table: "genres",
    foreign_column: "genre_id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const MUSICIAN_FK: ForeignKey = ForeignKey {
    foreign_table: "musicians",
    foreign_column: "musician_id",
    on_delete: ForeignKeyOnChange::Cascade,
};

// =============================================================================
// Entity Tables
// =============================================================================

pub const BANDS_TABLE: Table = Table {
    name: "bands",
    columns: &[
        sqlite_column!("band_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("band_url", &SqlType::Text, non_null = true),
        sqlite_column!("band_name", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["band_url"]],
};

pub const GENRES_TABLE: Table = Table {
    name: "genres",
    columns: &[
        sqlite_column!("genre_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("genre_name", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["genre_name"]],
};

pub const MUSICIANS_TABLE: Table = Table {
    name: "musicians",
    columns: &[
        sqlite_column!("musician_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("musician_url", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["musician_url"]],
};

/// Albums have no natural key of their own and are written after bands.
pub const ALBUMS_TABLE: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("album_id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "band_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&BAND_FK)
        ),
        sqlite_column!("album_name", &SqlType::Text),
        sqlite_column!("release_date", &SqlType::Text), // 'YYYY-MM-DD'
        sqlite_column!("description", &SqlType::Text),
        sqlite_column!("running_time", &SqlType::Real),
        sqlite_column!("sales", &SqlType::Integer),
    ],
    indices: &[],
    unique_constraints: &[],
};

// =============================================================================
// Association Tables
// =============================================================================

pub const HAS_GENRE_TABLE: Table = Table {
    name: "has_genre",
    columns: &[
        sqlite_column!(
            "band_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&BAND_FK)
        ),
        sqlite_column!(
            "genre_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&GENRE_FK)
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

pub const MEMBER_OF_TABLE: Table = Table {
    name: "member_of",
    columns: &[
        sqlite_column!(
            "musician_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&MUSICIAN_FK)
        ),
        sqlite_column!(
            "band_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&BAND_FK)
        ),
        sqlite_column!("active", &SqlType::Integer, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

pub const HAS_NAME_TABLE: Table = Table {
    name: "has_name",
    columns: &[
        sqlite_column!(
            "musician_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&MUSICIAN_FK)
        ),
        sqlite_column!("musician_name", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[],
};

pub const BAND_CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        BANDS_TABLE,
        GENRES_TABLE,
        MUSICIANS_TABLE,
        ALBUMS_TABLE,
        HAS_GENRE_TABLE,
        MEMBER_OF_TABLE,
        HAS_NAME_TABLE,
    ],
    migration: None,
}];
