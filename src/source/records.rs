//! Canonical band records.
//!
//! Groups the flat source rows by band URL into one typed [`Band`] per row of
//! the band name table. Nested collections keep the order in which rows were
//! encountered.

use super::parse::{parse, FieldKind};
use super::reader::{AlbumRow, SourceTables};
use crate::temporal::CalendarDate;
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq)]
pub struct Band {
    pub url: String,
    pub name: String,
    pub genres: Vec<String>,
    pub members: Vec<Membership>,
    pub albums: Vec<Album>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Membership {
    pub member_url: String,
    pub member_name: String,
    pub active: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Album {
    pub name: Option<String>,
    pub release_date: Option<CalendarDate>,
    pub description: Option<String>,
    pub running_time: Option<f64>,
    pub sales: Option<i64>,
}

impl Album {
    pub fn from_row(row: &AlbumRow) -> Self {
        Album {
            name: parse(FieldKind::Text, &row.album_name).into_text(),
            release_date: parse(FieldKind::Date, &row.release_date).into_date(),
            description: parse(FieldKind::Text, &row.description).into_text(),
            running_time: parse(FieldKind::Float, &row.running_time).into_float(),
            sales: parse(FieldKind::Integer, &row.sales).into_integer(),
        }
    }
}

/// Result of an extraction run.
#[derive(Clone, Debug, Default)]
pub struct Extraction {
    pub bands: Vec<Band>,
    /// Rows whose band URL is not in the band name table.
    pub orphan_rows: usize,
    /// Repeated band URLs in the band name table; the first occurrence wins.
    pub duplicate_bands: usize,
}

pub fn extract(tables: &SourceTables) -> Extraction {
    let mut extraction = Extraction::default();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for row in &tables.band_names {
        if positions.contains_key(row.band_url.as_str()) {
            extraction.duplicate_bands += 1;
            continue;
        }
        positions.insert(row.band_url.as_str(), extraction.bands.len());
        extraction.bands.push(Band {
            url: row.band_url.clone(),
            name: row.band_name.clone(),
            genres: Vec::new(),
            members: Vec::new(),
            albums: Vec::new(),
        });
    }

    let mut orphan_rows = 0usize;
    let mut band_for = |url: &str| -> Option<usize> {
        let position = positions.get(url).copied();
        if position.is_none() {
            orphan_rows += 1;
        }
        position
    };

    for row in &tables.genres {
        if let Some(position) = band_for(&row.band_url) {
            extraction.bands[position].genres.push(row.genre.clone());
        }
    }

    for row in &tables.members {
        if let Some(position) = band_for(&row.band_url) {
            extraction.bands[position].members.push(Membership {
                member_url: row.member_url.clone(),
                member_name: row.member_name.clone(),
                active: row.active,
            });
        }
    }

    for row in &tables.albums {
        if let Some(position) = band_for(&row.band_url) {
            extraction.bands[position].albums.push(Album::from_row(row));
        }
    }

    extraction.orphan_rows = orphan_rows;

    if extraction.orphan_rows > 0 {
        warn!(
            "Skipped {} rows referencing bands missing from the band name table",
            extraction.orphan_rows
        );
    }
    if extraction.duplicate_bands > 0 {
        warn!(
            "Ignored {} repeated band URLs in the band name table",
            extraction.duplicate_bands
        );
    }
    info!("Extracted {} canonical band records", extraction.bands.len());
    extraction
}
