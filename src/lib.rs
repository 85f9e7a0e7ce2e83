//! Band Catalog Library
//!
//! Projects a scraped band catalog into a normalized relational store and a
//! denormalized document store, and benchmarks one analytical query on both
//! across optimization levels.

pub mod bench;
pub mod config;
pub mod document;
pub mod error;
pub mod identity;
pub mod relational;
pub mod source;
pub mod sqlite_persistence;
pub mod temporal;

// Re-export commonly used types for convenience
pub use bench::{run_ladder, DocumentTarget, LevelReport, OptimizationLevel, RelationalTarget};
pub use config::{AppConfig, CliConfig, FileConfig};
pub use document::DocumentStore;
pub use error::IngestError;
pub use relational::{RelationalStore, SqliteRelationalStore};
pub use source::{extract, Band, SourceTables};
