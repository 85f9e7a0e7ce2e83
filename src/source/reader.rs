//! Reading of the delimited source tables.
//!
//! All files use `;` as field delimiter and may wrap fields in `"` or `'`,
//! which are stripped. The band, genre and member files start with a header
//! row; the album file has none.

use super::parse::{parse, strip_quotes, FieldKind};
use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

pub const BAND_NAMES_FILE: &str = "band-band_name.csv";
pub const GENRES_FILE: &str = "band-genre_name.csv";
pub const CURRENT_MEMBERS_FILE: &str = "band-member-member_name.csv";
pub const FORMER_MEMBERS_FILE: &str = "band-former_member-member_name.csv";
pub const ALBUMS_FILE: &str = "band-album_data.csv";

pub const FIELD_DELIMITER: u8 = b';';

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BandNameRow {
    pub band_url: String,
    pub band_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenreRow {
    pub band_url: String,
    pub genre: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberRow {
    pub band_url: String,
    pub member_url: String,
    pub member_name: String,
    pub active: bool,
}

/// Album row with its typed fields still as raw text; typing happens during extraction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlbumRow {
    pub band_url: String,
    pub album_name: String,
    pub release_date: String,
    pub description: String,
    pub running_time: String,
    pub sales: String,
}

/// The raw source collections, with current and former members merged.
#[derive(Clone, Debug, Default)]
pub struct SourceTables {
    pub band_names: Vec<BandNameRow>,
    pub genres: Vec<GenreRow>,
    pub members: Vec<MemberRow>,
    pub albums: Vec<AlbumRow>,
}

impl SourceTables {
    /// Load the five source files from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let open = |name: &str| {
            let path = dir.join(name);
            File::open(&path).with_context(|| format!("Failed to open source file {:?}", path))
        };
        Self::from_readers(
            open(BAND_NAMES_FILE)?,
            open(GENRES_FILE)?,
            open(CURRENT_MEMBERS_FILE)?,
            open(FORMER_MEMBERS_FILE)?,
            open(ALBUMS_FILE)?,
        )
    }

    pub fn from_readers<R: Read>(
        band_names: R,
        genres: R,
        current_members: R,
        former_members: R,
        albums: R,
    ) -> Result<Self> {
        let band_names = read_records(band_names, true, 2, Quoting::Off, BAND_NAMES_FILE)?
            .into_iter()
            .filter_map(|fields| {
                Some(BandNameRow {
                    band_url: text_field(&fields[0])?,
                    band_name: fields[1].trim().to_string(),
                })
            })
            .collect();

        let genres = read_records(genres, true, 2, Quoting::Off, GENRES_FILE)?
            .into_iter()
            .filter_map(|fields| {
                Some(GenreRow {
                    band_url: text_field(&fields[0])?,
                    genre: text_field(&fields[1])?,
                })
            })
            .collect();

        let mut members = member_rows(current_members, true, CURRENT_MEMBERS_FILE)?;
        members.extend(member_rows(former_members, false, FORMER_MEMBERS_FILE)?);

        let albums = read_records(albums, false, 6, Quoting::DoubleQuote, ALBUMS_FILE)?
            .into_iter()
            .filter_map(|fields| {
                Some(AlbumRow {
                    band_url: text_field(&fields[0])?,
                    album_name: fields[1].clone(),
                    release_date: fields[2].clone(),
                    description: fields[3].clone(),
                    running_time: fields[4].clone(),
                    sales: fields[5].clone(),
                })
            })
            .collect();

        Ok(SourceTables {
            band_names,
            genres,
            members,
            albums,
        })
    }
}

fn member_rows<R: Read>(reader: R, active: bool, file: &str) -> Result<Vec<MemberRow>> {
    Ok(read_records(reader, true, 3, Quoting::Off, file)?
        .into_iter()
        .filter_map(|fields| {
            Some(MemberRow {
                band_url: text_field(&fields[0])?,
                member_url: text_field(&fields[1])?,
                member_name: fields[2].trim().to_string(),
                active,
            })
        })
        .collect())
}

fn text_field(raw: &str) -> Option<String> {
    parse(FieldKind::Text, raw).into_text()
}

/// How a file's fields are delimited by quotes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Quoting {
    /// Quote characters stay in the fields and are stripped field by field.
    Off,
    /// `"` encloses fields that may contain the delimiter, as in free-text
    /// album descriptions. Stray quotes are still stripped afterwards.
    DoubleQuote,
}

/// Read all records of one file. Records with fewer than `min_fields` fields
/// are skipped.
fn read_records<R: Read>(
    reader: R,
    has_headers: bool,
    min_fields: usize,
    quoting: Quoting,
    file: &str,
) -> Result<Vec<Vec<String>>> {
    let mut builder = ReaderBuilder::new();
    builder
        .delimiter(FIELD_DELIMITER)
        .has_headers(has_headers)
        .flexible(true);
    match quoting {
        Quoting::Off => builder.quoting(false),
        Quoting::DoubleQuote => builder.quoting(true).quote(b'"'),
    };
    let mut reader = builder.from_reader(reader);

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for (line, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("Failed to read {} record {}", file, line + 1))?;
        if record.len() < min_fields {
            skipped += 1;
            continue;
        }
        rows.push(record.iter().map(strip_quotes).collect());
    }
    if skipped > 0 {
        warn!("Skipped {} short records in {}", skipped, file);
    }
    debug!("Read {} records from {}", rows.len(), file);
    Ok(rows)
}
