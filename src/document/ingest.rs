//! Write of canonical band records as one document per band.

use super::projector::project;
use super::store::DocumentStore;
use crate::error::IngestError;
use crate::source::Band;
use anyhow::Context;
use serde_json::Value;
use tracing::info;

pub const BANDS_COLLECTION: &str = "bands";

const DOCUMENTS_STAGE: &str = "documents";

/// Replace the band collection with the projection of `bands` and flush the
/// store. Returns the number of documents written.
pub fn ingest(store: &mut DocumentStore, bands: &[Band]) -> Result<usize, IngestError> {
    if store.drop_collection(BANDS_COLLECTION) {
        info!("Dropped existing {} collection", BANDS_COLLECTION);
    }

    let documents = project(bands)
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<Value>, _>>()
        .context("Failed to serialize band documents")
        .map_err(IngestError::stage(DOCUMENTS_STAGE))?;

    let ids = store
        .insert_many(BANDS_COLLECTION, documents)
        .map_err(IngestError::stage(DOCUMENTS_STAGE))?;
    store
        .flush()
        .map_err(IngestError::stage(DOCUMENTS_STAGE))?;

    info!("Inserted {} rows into {} collection", ids.len(), BANDS_COLLECTION);
    Ok(ids.len())
}
