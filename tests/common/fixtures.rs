//! Source file fixtures and imported test catalogs

use super::constants::*;
use anyhow::Result;
use band_catalog::source::reader::{
    ALBUMS_FILE, BAND_NAMES_FILE, CURRENT_MEMBERS_FILE, FORMER_MEMBERS_FILE, GENRES_FILE,
};
use band_catalog::source::{extract, Band, SourceTables};
use band_catalog::{document, relational, DocumentStore, SqliteRelationalStore};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Writes the five source files of a 3-band catalog into `dir`.
pub fn write_source_files(dir: &Path) -> Result<()> {
    fs::write(
        dir.join(BAND_NAMES_FILE),
        format!(
            "band;band_name\n\"{}\";\"{}\"\n\"{}\";\"{}\"\n\"{}\";\"{}\"\n",
            BAND_A_URL, BAND_A_NAME, BAND_B_URL, BAND_B_NAME, BAND_C_URL, BAND_C_NAME
        ),
    )?;

    fs::write(
        dir.join(GENRES_FILE),
        format!(
            "band;genre_name\n\
             \"{a}\";\"Rock\"\n\
             \"{a}\";\"Rock\"\n\
             \"{a}\";\"Pop\"\n\
             \"{b}\";\"Pop\"\n\
             \"{c}\";\"Rock\"\n\
             \"{c}\";\"Metal\"\n\
             \"{orphan}\";\"Jazz\"\n",
            a = BAND_A_URL,
            b = BAND_B_URL,
            c = BAND_C_URL,
            orphan = ORPHAN_BAND_URL
        ),
    )?;

    fs::write(
        dir.join(CURRENT_MEMBERS_FILE),
        format!(
            "band;member;member_name\n\
             \"{a}\";\"{m1}\";\"{m1_name}\"\n\
             \"{b}\";\"{m1}\";\"{m1_alias}\"\n",
            a = BAND_A_URL,
            b = BAND_B_URL,
            m1 = MUSICIAN_1_URL,
            m1_name = MUSICIAN_1_NAME,
            m1_alias = MUSICIAN_1_ALIAS
        ),
    )?;

    fs::write(
        dir.join(FORMER_MEMBERS_FILE),
        format!(
            "band;former_member;member_name\n\
             '{a}';'{m1}';'{m1_name}'\n\
             '{c}';'{m2}';'{m2_name}'\n",
            a = BAND_A_URL,
            c = BAND_C_URL,
            m1 = MUSICIAN_1_URL,
            m1_name = MUSICIAN_1_NAME,
            m2 = MUSICIAN_2_URL,
            m2_name = MUSICIAN_2_NAME
        ),
    )?;

    // No header row in the album file
    fs::write(
        dir.join(ALBUMS_FILE),
        format!(
            "\"{a}\";\"First Light\";\"15/06/1995\";\"Debut\";\"41.5\";\"100\"\n\
             \"{a}\";\"{christmas}\";\"{christmas_date}\";\"Seasonal\";\"38\";\"5\"\n\
             \"{a}\";\"Late Bloom\";\"20/03/2015\";\"\";\"44\";\"50\"\n\
             \"{a}\";\"{undated}\";\"not a date\";\"Bootleg\";\"\";\"999999\"\n\
             \"{b}\";\"Beta One\";\"01/02/1995\";\"\";\"35\";\"80\"\n\
             \"{b}\";\"Beta Late\";\"05/05/2015\";\"\";\"52.25\";\"300\"\n\
             \"{c}\";\"Gamma One\";\"10/10/1995\";\"\";\"47\";\"30\"\n\
             \"{c}\";\"Gamma Zero\";\"01/01/2000\";\"Millennium; remastered\";\"60\";\"1000\"\n\
             \"{c}\";\"Gamma Late\";\"11/11/2015\";\"\";\"39\";\"200\"\n\
             \"{c}\";\"Gamma Unsold\";\"25/12/1996\";\"\";\"33\";\"\"\n",
            a = BAND_A_URL,
            b = BAND_B_URL,
            c = BAND_C_URL,
            christmas = CHRISTMAS_ALBUM,
            christmas_date = CHRISTMAS_SOURCE_DATE,
            undated = UNDATED_ALBUM
        ),
    )?;

    Ok(())
}

/// Extracts the fixture catalog into canonical band records.
pub fn read_test_bands(dir: &Path) -> Result<Vec<Band>> {
    let tables = SourceTables::load(dir)?;
    Ok(extract(&tables).bands)
}

/// A temporary directory holding the source files and both imported stores.
pub struct TestCatalog {
    pub dir: TempDir,
    pub source_dir: PathBuf,
    pub relational_db: PathBuf,
    pub document_db: PathBuf,
}

impl TestCatalog {
    /// Writes the source files without importing anything.
    pub fn with_sources() -> Result<Self> {
        let dir = TempDir::new()?;
        let source_dir = dir.path().join("source");
        fs::create_dir_all(&source_dir)?;
        write_source_files(&source_dir)?;

        let relational_db = dir.path().join("catalog.db");
        let document_db = dir.path().join("catalog.json");
        Ok(TestCatalog {
            dir,
            source_dir,
            relational_db,
            document_db,
        })
    }

    /// Writes the source files and imports them into both models.
    pub fn imported() -> Result<Self> {
        let catalog = Self::with_sources()?;
        let bands = read_test_bands(&catalog.source_dir)?;

        let relational_store = SqliteRelationalStore::open(&catalog.relational_db)?;
        relational::ingest(&relational_store, &bands)?;

        let mut document_store = DocumentStore::open(&catalog.document_db)?;
        document::ingest(&mut document_store, &bands)?;

        Ok(catalog)
    }
}
