//! SQLite-backed relational store for the normalized band catalog.

use super::schema::BAND_CATALOG_VERSIONED_SCHEMAS;
use crate::sqlite_persistence::{Table, BASE_DB_VERSION};
use anyhow::{bail, Context, Result};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;
use tracing::{debug, info};

/// Minimal operation contract the ingestion and the benchmark need from a
/// relational engine.
pub trait RelationalStore {
    /// Insert `rows` (values for [`Table::insert_columns`], in order) in one
    /// transaction. Returns the generated surrogate ids in input order.
    fn bulk_insert(&self, table: &Table, rows: &[Vec<Value>]) -> Result<Vec<i64>>;

    fn execute(&self, sql: &str) -> Result<()>;

    fn query_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>>;

    fn create_index(&self, name: &str, table: &str, columns: &[&str]) -> Result<()>;

    /// Drop every explicitly created index on `table`. Indexes backing
    /// primary keys and unique constraints are left in place.
    fn drop_indexes(&self, table: &str) -> Result<usize>;

    fn create_view(&self, name: &str, select: &str) -> Result<()>;

    /// Store the result of `select` as table `name`, replacing any previous one.
    fn materialize_view(&self, name: &str, select: &str) -> Result<()>;

    /// Create a table outside the catalog schema, such as a benchmark artifact.
    fn create_table(&self, table: &Table) -> Result<()>;

    fn drop_table(&self, name: &str) -> Result<()>;

    fn count_rows(&self, table: &str) -> Result<usize>;
}

pub struct SqliteRelationalStore {
    conn: Connection,
}

fn migrate_if_needed(conn: &mut Connection) -> Result<()> {
    let latest_version = BAND_CATALOG_VERSIONED_SCHEMAS.len() - 1;
    let latest_schema = &BAND_CATALOG_VERSIONED_SCHEMAS[latest_version];

    let table_count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
            [],
            |r| r.get(0),
        )
        .unwrap_or(0);

    if table_count == 0 {
        info!("Creating band catalog db schema at version {}", latest_version);
        latest_schema.create(conn)?;
        return Ok(());
    }

    let db_version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    if db_version < BASE_DB_VERSION as i64 {
        bail!(
            "Database user_version {} is not a band catalog schema version",
            db_version
        );
    }
    let current_version = (db_version - BASE_DB_VERSION as i64) as usize;
    if current_version > latest_version {
        bail!(
            "Database schema version {} is newer than the supported version {}",
            current_version,
            latest_version
        );
    }

    if current_version < latest_version {
        let tx = conn.transaction()?;
        let mut version = current_version;
        for schema in BAND_CATALOG_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
            if let Some(migration_fn) = schema.migration {
                info!(
                    "Migrating band catalog db from version {} to {}",
                    version, schema.version
                );
                migration_fn(&tx)?;
            }
            version = schema.version;
        }
        tx.pragma_update(None, "user_version", BASE_DB_VERSION + version)?;
        tx.commit()?;
    }

    #[cfg(not(feature = "no_checks"))]
    latest_schema
        .validate(conn)
        .context("Band catalog schema validation failed")?;

    Ok(())
}

impl SqliteRelationalStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open relational database {:?}", db_path))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate_if_needed(&mut conn)?;
        Ok(SqliteRelationalStore { conn })
    }
}

impl RelationalStore for SqliteRelationalStore {
    fn bulk_insert(&self, table: &Table, rows: &[Vec<Value>]) -> Result<Vec<i64>> {
        let columns = table.insert_columns();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.name,
            columns.join(", "),
            placeholders.join(", ")
        );

        let conn = &self.conn;
        conn.execute("BEGIN IMMEDIATE", [])?;

        let result = (|| -> Result<Vec<i64>> {
            let mut stmt = conn.prepare_cached(&sql)?;
            let mut ids = Vec::with_capacity(rows.len());
            for (row_index, row) in rows.iter().enumerate() {
                if row.len() != columns.len() {
                    bail!(
                        "Row {} for table {} has {} values, expected {}",
                        row_index,
                        table.name,
                        row.len(),
                        columns.len()
                    );
                }
                ids.push(stmt.insert(params_from_iter(row.iter()))?);
            }
            Ok(ids)
        })();

        match result {
            Ok(ids) => {
                conn.execute("COMMIT", [])?;
                debug!("Committed {} rows into {}", ids.len(), table.name);
                Ok(ids)
            }
            Err(e) => {
                let _ = conn.execute("ROLLBACK", []);
                Err(e)
            }
        }
    }

    fn execute(&self, sql: &str) -> Result<()> {
        self.conn
            .execute_batch(sql)
            .with_context(|| format!("Failed to execute: {}", sql))
    }

    fn query_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Vec<Value>>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let column_count = stmt.column_count();
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                (0..column_count)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn create_index(&self, name: &str, table: &str, columns: &[&str]) -> Result<()> {
        self.conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS {} ON {}({})",
                name,
                table,
                columns.join(", ")
            ),
            params![],
        )?;
        Ok(())
    }

    fn drop_indexes(&self, table: &str) -> Result<usize> {
        let names: Vec<String> = {
            let mut stmt = self.conn.prepare(
                "SELECT name FROM sqlite_master WHERE type='index' AND tbl_name=?1 AND sql IS NOT NULL",
            )?;
            let names = stmt
                .query_map(params![table], |r| r.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            names
        };
        for name in &names {
            self.conn
                .execute(&format!("DROP INDEX IF EXISTS {}", name), params![])?;
        }
        Ok(names.len())
    }

    fn create_view(&self, name: &str, select: &str) -> Result<()> {
        self.conn.execute_batch(&format!(
            "DROP VIEW IF EXISTS {name}; CREATE VIEW {name} AS {select};"
        ))?;
        Ok(())
    }

    fn materialize_view(&self, name: &str, select: &str) -> Result<()> {
        self.conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {name}; CREATE TABLE {name} AS {select};"
        ))?;
        Ok(())
    }

    fn create_table(&self, table: &Table) -> Result<()> {
        table
            .create(&self.conn)
            .with_context(|| format!("Failed to create table {}", table.name))
    }

    fn drop_table(&self, name: &str) -> Result<()> {
        self.conn
            .execute(&format!("DROP TABLE IF EXISTS {}", name), params![])?;
        Ok(())
    }

    fn count_rows(&self, table: &str) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
        Ok(count as usize)
    }
}
