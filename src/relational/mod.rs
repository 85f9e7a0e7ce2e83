//! Normalized relational form of the band catalog.

pub mod ingest;
pub mod projector;
pub mod schema;
pub mod store;

pub use ingest::{ingest, IngestSummary};
pub use projector::{AssociationTuples, EntityTuples};
pub use store::{RelationalStore, SqliteRelationalStore};
