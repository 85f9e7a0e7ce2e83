//! Denormalized document form of the band catalog: one document per band.

pub mod ingest;
pub mod maintenance;
pub mod pipeline;
pub mod projector;
pub mod store;

pub use ingest::{ingest, BANDS_COLLECTION};
pub use pipeline::{Accumulator, Filter, PipelineError, SortOrder, Stage};
pub use projector::{project, AlbumEntry, BandDocument, GenreEntry, MemberEntry};
pub use store::{DocId, DocumentStore, Update};
